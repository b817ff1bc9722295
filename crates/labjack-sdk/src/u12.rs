#![allow(unsafe_code)]

use crate::{AnalogSample, DigitalSample, Result, SdkError, U12};
use std::ffi::c_long;

#[link(name = "ljackuw")]
extern "system" {
    fn EAnalogIn(
        idnum: *mut c_long,
        demo: c_long,
        channel: c_long,
        gain: c_long,
        over_voltage: *mut c_long,
        voltage: *mut f32,
    ) -> c_long;
    fn EAnalogOut(idnum: *mut c_long, demo: c_long, ao0: f32, ao1: f32) -> c_long;
    fn EDigitalIn(
        idnum: *mut c_long,
        demo: c_long,
        channel: c_long,
        read_d: c_long,
        state: *mut c_long,
    ) -> c_long;
    fn EDigitalOut(
        idnum: *mut c_long,
        demo: c_long,
        channel: c_long,
        write_d: c_long,
        state: c_long,
    ) -> c_long;
}

/// Output value the driver treats as "leave unchanged".
const UNCHANGED: f32 = -1.0;

/// The legacy U12 driver (`ljackuw.dll`), linked at build time.
#[derive(Debug, Default, Clone, Copy)]
pub struct U12Library;

impl U12Library {
    pub fn new() -> Self {
        Self
    }
}

fn check(err: c_long) -> Result<()> {
    if err == 0 {
        Ok(())
    } else {
        Err(SdkError::vendor(err))
    }
}

impl U12 for U12Library {
    fn analog_in(&self, id: i32, channel: i32, gain: i32) -> Result<AnalogSample> {
        let mut idnum: c_long = id;
        let mut over: c_long = 0;
        let mut voltage = 0.0f32;
        // SAFETY: out-parameters are live locals; demo mode is off.
        let err = unsafe { EAnalogIn(&mut idnum, 0, channel, gain, &mut over, &mut voltage) };
        check(err)?;
        Ok(AnalogSample {
            id: idnum,
            voltage,
            over_voltage: over != 0,
        })
    }

    fn analog_out(&self, id: i32, ao0: Option<f32>, ao1: Option<f32>) -> Result<i32> {
        let mut idnum: c_long = id;
        // SAFETY: idnum is a live local.
        let err = unsafe {
            EAnalogOut(
                &mut idnum,
                0,
                ao0.unwrap_or(UNCHANGED),
                ao1.unwrap_or(UNCHANGED),
            )
        };
        check(err)?;
        Ok(idnum)
    }

    fn digital_in(&self, id: i32, channel: i32, d_port: bool) -> Result<DigitalSample> {
        let mut idnum: c_long = id;
        let mut state: c_long = 0;
        // SAFETY: out-parameters are live locals.
        let err = unsafe { EDigitalIn(&mut idnum, 0, channel, c_long::from(d_port), &mut state) };
        check(err)?;
        Ok(DigitalSample {
            id: idnum,
            state: state != 0,
        })
    }

    fn digital_out(&self, id: i32, channel: i32, d_port: bool, state: bool) -> Result<i32> {
        let mut idnum: c_long = id;
        // SAFETY: idnum is a live local.
        let err = unsafe {
            EDigitalOut(
                &mut idnum,
                0,
                channel,
                c_long::from(d_port),
                c_long::from(state),
            )
        };
        check(err)?;
        Ok(idnum)
    }
}
