#![allow(unsafe_code)]

use crate::{
    Handle, HandleInfo, Ljm, OpenSpec, RegisterType, Result, SdkError, STRING_ALLOCATION_SIZE,
};
use std::ffi::{c_char, c_int, CStr, CString};
use tracing::debug;

const LJME_NOERROR: c_int = 0;
const MAX_NAME_SIZE: usize = 256;
const INITIAL_ERR_ADDRESS: c_int = -2;

#[link(name = "LabJackM")]
extern "system" {
    fn LJM_OpenS(
        device_type: *const c_char,
        connection_type: *const c_char,
        identifier: *const c_char,
        handle: *mut c_int,
    ) -> c_int;
    fn LJM_Close(handle: c_int) -> c_int;
    fn LJM_NameToAddress(name: *const c_char, address: *mut c_int, ty: *mut c_int) -> c_int;
    fn LJM_AddressToType(address: c_int, ty: *mut c_int) -> c_int;
    fn LJM_eReadAddress(handle: c_int, address: c_int, ty: c_int, value: *mut f64) -> c_int;
    fn LJM_eWriteAddress(handle: c_int, address: c_int, ty: c_int, value: f64) -> c_int;
    fn LJM_eReadAddressString(handle: c_int, address: c_int, string: *mut c_char) -> c_int;
    fn LJM_eWriteAddressString(handle: c_int, address: c_int, string: *const c_char) -> c_int;
    fn LJM_eReadAddressByteArray(
        handle: c_int,
        address: c_int,
        num_bytes: c_int,
        bytes: *mut c_char,
        error_address: *mut c_int,
    ) -> c_int;
    fn LJM_eWriteAddressByteArray(
        handle: c_int,
        address: c_int,
        num_bytes: c_int,
        bytes: *const c_char,
        error_address: *mut c_int,
    ) -> c_int;
    fn LJM_GetHandleInfo(
        handle: c_int,
        device_type: *mut c_int,
        connection_type: *mut c_int,
        serial_number: *mut c_int,
        ip_address: *mut c_int,
        port: *mut c_int,
        max_bytes_per_mb: *mut c_int,
    ) -> c_int;
    fn LJM_ErrorToString(code: c_int, name: *mut c_char);
}

/// The LabJack LJM library, linked at build time.
#[derive(Debug, Default, Clone, Copy)]
pub struct LjmLibrary;

impl LjmLibrary {
    pub fn new() -> Self {
        Self
    }
}

fn check(err: c_int, address: Option<u32>) -> Result<()> {
    if err == LJME_NOERROR {
        Ok(())
    } else {
        Err(SdkError::Vendor { code: err, address })
    }
}

fn c_string(value: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| SdkError::InvalidArgument(format!("interior nul in {value:?}")))
}

fn c_address(address: u32) -> Result<c_int> {
    c_int::try_from(address).map_err(|_| SdkError::UnknownAddress(address))
}

fn c_len(len: usize) -> Result<c_int> {
    c_int::try_from(len).map_err(|_| SdkError::InvalidArgument(format!("length {len}")))
}

fn wire_type(raw: c_int) -> Result<RegisterType> {
    RegisterType::from_raw(raw)
        .ok_or_else(|| SdkError::InvalidArgument(format!("unknown wire type {raw}")))
}

/// Blame the address the driver reports, falling back to the requested one.
fn fault_address(reported: c_int, requested: u32) -> Option<u32> {
    u32::try_from(reported).ok().or(Some(requested))
}

impl Ljm for LjmLibrary {
    fn open(&self, spec: &OpenSpec) -> Result<Handle> {
        let device_type = c_string(&spec.device_type)?;
        let connection_type = c_string(&spec.connection_type)?;
        let identifier = c_string(&spec.identifier)?;
        let mut handle: c_int = 0;
        // SAFETY: all pointers are valid nul-terminated strings or a live out-parameter.
        let err = unsafe {
            LJM_OpenS(
                device_type.as_ptr(),
                connection_type.as_ptr(),
                identifier.as_ptr(),
                &mut handle,
            )
        };
        check(err, None)?;
        debug!(%spec, handle, "LJM_OpenS");
        Ok(Handle(handle))
    }

    fn close(&self, handle: Handle) -> Result<()> {
        // SAFETY: plain integer argument.
        check(unsafe { LJM_Close(handle.0) }, None)
    }

    fn name_to_address(&self, name: &str) -> Result<(u32, RegisterType)> {
        let cname = c_string(name)?;
        let mut address: c_int = 0;
        let mut ty: c_int = 0;
        // SAFETY: valid C string and out-parameters.
        let err = unsafe { LJM_NameToAddress(cname.as_ptr(), &mut address, &mut ty) };
        if err != LJME_NOERROR {
            return Err(SdkError::UnknownName(name.to_string()));
        }
        let address =
            u32::try_from(address).map_err(|_| SdkError::UnknownName(name.to_string()))?;
        Ok((address, wire_type(ty)?))
    }

    fn address_to_type(&self, address: u32) -> Result<RegisterType> {
        let mut ty: c_int = 0;
        // SAFETY: valid out-parameter.
        let err = unsafe { LJM_AddressToType(c_address(address)?, &mut ty) };
        if err != LJME_NOERROR {
            return Err(SdkError::UnknownAddress(address));
        }
        wire_type(ty)
    }

    fn read_value(&self, handle: Handle, address: u32, ty: RegisterType) -> Result<f64> {
        let mut value = 0.0f64;
        // SAFETY: valid out-parameter.
        let err =
            unsafe { LJM_eReadAddress(handle.0, c_address(address)?, ty.raw(), &mut value) };
        check(err, Some(address))?;
        Ok(value)
    }

    fn write_value(
        &self,
        handle: Handle,
        address: u32,
        ty: RegisterType,
        value: f64,
    ) -> Result<()> {
        // SAFETY: plain value arguments.
        let err = unsafe { LJM_eWriteAddress(handle.0, c_address(address)?, ty.raw(), value) };
        check(err, Some(address))
    }

    fn read_string(&self, handle: Handle, address: u32) -> Result<String> {
        let mut buf = [0 as c_char; STRING_ALLOCATION_SIZE];
        // SAFETY: the driver writes at most STRING_ALLOCATION_SIZE bytes, terminator included.
        let err =
            unsafe { LJM_eReadAddressString(handle.0, c_address(address)?, buf.as_mut_ptr()) };
        check(err, Some(address))?;
        buf[STRING_ALLOCATION_SIZE - 1] = 0;
        // SAFETY: buf is nul-terminated above.
        let s = unsafe { CStr::from_ptr(buf.as_ptr()) };
        Ok(s.to_string_lossy().into_owned())
    }

    fn write_string(&self, handle: Handle, address: u32, value: &str) -> Result<()> {
        if value.len() >= STRING_ALLOCATION_SIZE {
            return Err(SdkError::InvalidArgument(format!(
                "string longer than {} bytes",
                STRING_ALLOCATION_SIZE - 1
            )));
        }
        let cvalue = c_string(value)?;
        // SAFETY: valid C string shorter than the driver's string capacity.
        let err =
            unsafe { LJM_eWriteAddressString(handle.0, c_address(address)?, cvalue.as_ptr()) };
        check(err, Some(address))
    }

    fn read_byte_array(&self, handle: Handle, address: u32, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut error_address = INITIAL_ERR_ADDRESS;
        // SAFETY: buf holds exactly `len` bytes.
        let err = unsafe {
            LJM_eReadAddressByteArray(
                handle.0,
                c_address(address)?,
                c_len(len)?,
                buf.as_mut_ptr().cast::<c_char>(),
                &mut error_address,
            )
        };
        if err != LJME_NOERROR {
            return Err(SdkError::Vendor {
                code: err,
                address: fault_address(error_address, address),
            });
        }
        Ok(buf)
    }

    fn write_byte_array(&self, handle: Handle, address: u32, bytes: &[u8]) -> Result<()> {
        let mut error_address = INITIAL_ERR_ADDRESS;
        // SAFETY: the driver reads exactly `bytes.len()` bytes.
        let err = unsafe {
            LJM_eWriteAddressByteArray(
                handle.0,
                c_address(address)?,
                c_len(bytes.len())?,
                bytes.as_ptr().cast::<c_char>(),
                &mut error_address,
            )
        };
        if err != LJME_NOERROR {
            return Err(SdkError::Vendor {
                code: err,
                address: fault_address(error_address, address),
            });
        }
        Ok(())
    }

    fn handle_info(&self, handle: Handle) -> Result<HandleInfo> {
        let mut info = HandleInfo {
            device_type: 0,
            connection_type: 0,
            serial_number: 0,
            ip_address: 0,
            port: 0,
            max_bytes_per_mb: 0,
        };
        // SAFETY: every out-parameter points into `info`.
        let err = unsafe {
            LJM_GetHandleInfo(
                handle.0,
                &mut info.device_type,
                &mut info.connection_type,
                &mut info.serial_number,
                &mut info.ip_address,
                &mut info.port,
                &mut info.max_bytes_per_mb,
            )
        };
        check(err, None)?;
        Ok(info)
    }

    fn error_to_string(&self, code: i32) -> String {
        let mut buf = [0 as c_char; MAX_NAME_SIZE];
        // SAFETY: the driver writes at most LJM_MAX_NAME_SIZE bytes.
        unsafe { LJM_ErrorToString(code, buf.as_mut_ptr()) };
        buf[MAX_NAME_SIZE - 1] = 0;
        // SAFETY: buf is nul-terminated above.
        unsafe { CStr::from_ptr(buf.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}
