//! Legacy U12 channel classes: `ljai`, `ljao`, `ljdo` and `ljdi`.
//!
//! Each channel remembers the last value it acquired or set. A `write`
//! talks to the driver and publishes that value to linked channels; a `read`
//! only returns the remembered value. The unit id starts at `-1` (first
//! found) and is replaced by the id the driver reports back.

use crate::{
    Channel, ChannelClass, ChannelError, ChannelHost, ChannelId, Context, Param, Reply, Result,
};
use labjack_sdk::U12;
use std::sync::Arc;
use tracing::debug;

/// Register the four U12 classes on `host`.
pub fn install(host: &mut ChannelHost, sdk: Arc<dyn U12>) {
    for kind in [Kind::AnalogIn, Kind::AnalogOut, Kind::DigitalOut, Kind::DigitalIn] {
        host.register_class(Box::new(U12Class {
            kind,
            sdk: Arc::clone(&sdk),
        }));
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Kind {
    AnalogIn,
    AnalogOut,
    DigitalOut,
    DigitalIn,
}

struct U12Class {
    kind: Kind,
    sdk: Arc<dyn U12>,
}

impl ChannelClass for U12Class {
    fn name(&self) -> &'static str {
        match self.kind {
            Kind::AnalogIn => "ljai",
            Kind::AnalogOut => "ljao",
            Kind::DigitalOut => "ljdo",
            Kind::DigitalIn => "ljdi",
        }
    }

    fn help(&self) -> &'static str {
        match self.kind {
            Kind::AnalogIn => {
                "labjack u12 analog input.\r\n\
                 create ljai ch_name | channel\r\n\
                 setup ch_name channel(0-11) | gain(0-7) | idnum(-1)\r\n\
                 write ch_name #acquire voltage\r\n\
                 read ch_name #last acquired voltage\r\n"
            }
            Kind::AnalogOut => {
                "labjack u12 analog output.\r\n\
                 create ljao ch_name | channel\r\n\
                 setup ch_name channel(0-1) | idnum(-1)\r\n\
                 write ch_name voltage #set voltage\r\n\
                 read ch_name #last set voltage\r\n"
            }
            Kind::DigitalOut => {
                "labjack u12 digital output.\r\n\
                 create ljdo ch_name | channel\r\n\
                 setup ch_name channel(IO0-IO3/D0-D15) | Dport | idnum(-1)\r\n\
                 write ch_name state #set state\r\n\
                 read ch_name #last written state\r\n"
            }
            Kind::DigitalIn => {
                "labjack u12 digital input.\r\n\
                 create ljdi ch_name | channel\r\n\
                 setup ch_name channel(IO0-IO3/D0-D15) | Dport | idnum(-1)\r\n\
                 write ch_name #acquire state\r\n\
                 read ch_name #last acquired state\r\n"
            }
        }
    }

    fn create(&self, _id: ChannelId, params: &[Param]) -> Result<Box<dyn Channel>> {
        let channel = params.first().map(int_param).transpose()?.unwrap_or(0);
        let sdk = Arc::clone(&self.sdk);
        let instance: Box<dyn Channel> = match self.kind {
            Kind::AnalogIn => Box::new(AnalogIn {
                sdk,
                id: -1,
                channel,
                gain: 0,
                voltage: 0.0,
            }),
            Kind::AnalogOut => Box::new(AnalogOut {
                sdk,
                id: -1,
                channel,
                voltage: 0.0,
            }),
            Kind::DigitalOut => Box::new(DigitalOut(Digital::new(sdk, channel))),
            Kind::DigitalIn => Box::new(DigitalIn(Digital::new(sdk, channel))),
        };
        Ok(instance)
    }
}

fn int_param(param: &Param) -> Result<i32> {
    let value = param.to_int();
    i32::try_from(value).map_err(|_| {
        ChannelError::InvalidParameter(format!("{value} does not fit a u12 argument"))
    })
}

fn int_at(params: &[Param], index: usize) -> Result<Option<i32>> {
    params.get(index).map(int_param).transpose()
}

struct AnalogIn {
    sdk: Arc<dyn U12>,
    id: i32,
    channel: i32,
    gain: i32,
    voltage: f32,
}

impl Channel for AnalogIn {
    /// `channel | gain | idnum`
    fn setup(&mut self, _ctx: &mut Context<'_>, params: &[Param]) -> Result<()> {
        if let Some(channel) = int_at(params, 0)? {
            self.channel = channel;
        }
        if let Some(gain) = int_at(params, 1)? {
            self.gain = gain;
        }
        if let Some(id) = int_at(params, 2)? {
            self.id = id;
        }
        Ok(())
    }

    fn read(&mut self, _ctx: &mut Context<'_>, _params: &[Param]) -> Result<Reply> {
        Ok(Reply::Float(f64::from(self.voltage)))
    }

    fn write(&mut self, ctx: &mut Context<'_>, _params: &[Param]) -> Result<Reply> {
        let sample = self.sdk.analog_in(self.id, self.channel, self.gain)?;
        if sample.over_voltage {
            debug!(channel = self.channel, voltage = sample.voltage, "u12 input over voltage");
        }
        self.id = sample.id;
        self.voltage = sample.voltage;
        ctx.publish(Param::Float(f64::from(self.voltage)));
        Ok(Reply::Empty)
    }
}

struct AnalogOut {
    sdk: Arc<dyn U12>,
    id: i32,
    channel: i32,
    voltage: f32,
}

impl Channel for AnalogOut {
    /// `channel | idnum`
    fn setup(&mut self, _ctx: &mut Context<'_>, params: &[Param]) -> Result<()> {
        if let Some(channel) = int_at(params, 0)? {
            self.channel = channel;
        }
        if let Some(id) = int_at(params, 1)? {
            self.id = id;
        }
        Ok(())
    }

    fn read(&mut self, _ctx: &mut Context<'_>, _params: &[Param]) -> Result<Reply> {
        Ok(Reply::Float(f64::from(self.voltage)))
    }

    /// Channels other than 0 and 1 remember the voltage without driving an output.
    fn write(&mut self, ctx: &mut Context<'_>, params: &[Param]) -> Result<Reply> {
        self.voltage = params.first().map(|p| p.to_float() as f32).unwrap_or(0.0);
        let outputs = match self.channel {
            0 => Some((Some(self.voltage), None)),
            1 => Some((None, Some(self.voltage))),
            _ => None,
        };
        if let Some((ao0, ao1)) = outputs {
            self.id = self.sdk.analog_out(self.id, ao0, ao1)?;
        }
        ctx.publish(Param::Float(f64::from(self.voltage)));
        Ok(Reply::Empty)
    }
}

struct Digital {
    sdk: Arc<dyn U12>,
    id: i32,
    channel: i32,
    d_port: bool,
    state: bool,
}

impl Digital {
    fn new(sdk: Arc<dyn U12>, channel: i32) -> Self {
        Self {
            sdk,
            id: -1,
            channel,
            d_port: false,
            state: false,
        }
    }

    /// `channel | Dport | idnum`
    fn setup(&mut self, params: &[Param]) -> Result<()> {
        if let Some(channel) = int_at(params, 0)? {
            self.channel = channel;
        }
        if let Some(d_port) = int_at(params, 1)? {
            self.d_port = d_port != 0;
        }
        if let Some(id) = int_at(params, 2)? {
            self.id = id;
        }
        Ok(())
    }

    fn state(&self) -> Param {
        Param::Int(i64::from(self.state))
    }
}

struct DigitalOut(Digital);

impl Channel for DigitalOut {
    fn setup(&mut self, _ctx: &mut Context<'_>, params: &[Param]) -> Result<()> {
        self.0.setup(params)
    }

    fn read(&mut self, _ctx: &mut Context<'_>, _params: &[Param]) -> Result<Reply> {
        Ok(Reply::from(self.0.state()))
    }

    fn write(&mut self, ctx: &mut Context<'_>, params: &[Param]) -> Result<Reply> {
        let d = &mut self.0;
        d.state = params.first().map(|p| p.to_int() != 0).unwrap_or(false);
        d.id = d.sdk.digital_out(d.id, d.channel, d.d_port, d.state)?;
        ctx.publish(d.state());
        Ok(Reply::Empty)
    }
}

struct DigitalIn(Digital);

impl Channel for DigitalIn {
    fn setup(&mut self, _ctx: &mut Context<'_>, params: &[Param]) -> Result<()> {
        self.0.setup(params)
    }

    fn read(&mut self, _ctx: &mut Context<'_>, _params: &[Param]) -> Result<Reply> {
        Ok(Reply::from(self.0.state()))
    }

    fn write(&mut self, ctx: &mut Context<'_>, _params: &[Param]) -> Result<Reply> {
        let d = &mut self.0;
        let sample = d.sdk.digital_in(d.id, d.channel, d.d_port)?;
        d.id = sample.id;
        d.state = sample.state;
        ctx.publish(d.state());
        Ok(Reply::Empty)
    }
}
