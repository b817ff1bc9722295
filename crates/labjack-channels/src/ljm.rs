//! `ljmdev` and `ljmreg` channel classes over the LJM library.

use crate::register::truncate_to_string_capacity;
use crate::{
    Channel, ChannelClass, ChannelError, ChannelHost, ChannelId, Context, DeviceEntry,
    DeviceRegistry, Param, RegisterConfig, RegisterEntry, RegisterOptions, RegisterRef, Reply,
    Result,
};
use labjack_sdk::{diag, Ljm, OpenSpec, RegisterType};
use std::sync::Arc;
use tracing::{debug, warn};

const DEVICE_HELP: &str = "ljm device channel - LabJack LJM library device.\r\n\
 create ljmdev newname\r\n\
 setup newname | DeviceType ConnectionType Identifier\r\n\
   #no parameters opens the first device found on any connection\r\n\
 write newname register value #write value to register (name or address)\r\n\
 read newname register #read register (name or address)\r\n";

const REGISTER_HELP: &str = "ljm register channel - one device register.\r\n\
 create ljmreg newname\r\n\
 setup newname ljm_device_channel device_register(name or address)\r\n\
   | type(AUTO) | length_register\r\n\
   #type={AUTO, LJM_BYTE, LJM_STRING, BYTE_ARRAY, LJM_UINT16,\r\n\
   #      LJM_UINT32, LJM_INT32, LJM_FLOAT32}\r\n\
 write newname value #write to register\r\n\
 write newname #read register and send result to linked channels\r\n\
 read newname #read register\r\n\
 link newname channel\r\n";

/// The LJM classes and the device registry they share.
#[derive(Clone)]
pub struct LjmModule {
    sdk: Arc<dyn Ljm>,
    registry: Arc<DeviceRegistry>,
    options: RegisterOptions,
}

impl LjmModule {
    pub fn new(sdk: Arc<dyn Ljm>, options: RegisterOptions) -> Self {
        Self {
            sdk,
            registry: Arc::new(DeviceRegistry::new()),
            options,
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn install(&self, host: &mut ChannelHost) {
        host.register_class(Box::new(DeviceClass(self.clone())));
        host.register_class(Box::new(RegisterClass(self.clone())));
    }
}

/// Register `ljmdev` and `ljmreg` on `host` and return the registry they share.
pub fn install(
    host: &mut ChannelHost,
    sdk: Arc<dyn Ljm>,
    options: RegisterOptions,
) -> Arc<DeviceRegistry> {
    let module = LjmModule::new(sdk, options);
    module.install(host);
    Arc::clone(module.registry())
}

struct DeviceClass(LjmModule);

impl ChannelClass for DeviceClass {
    fn name(&self) -> &'static str {
        "ljmdev"
    }

    fn help(&self) -> &'static str {
        DEVICE_HELP
    }

    fn create(&self, id: ChannelId, _params: &[Param]) -> Result<Box<dyn Channel>> {
        let entry = self.0.registry.register_device(id);
        Ok(Box::new(DeviceChannel::new(Arc::clone(&self.0.sdk), entry)))
    }
}

/// An LJM device connection, with ad-hoc register access.
pub struct DeviceChannel {
    sdk: Arc<dyn Ljm>,
    entry: Arc<DeviceEntry>,
}

impl DeviceChannel {
    pub fn new(sdk: Arc<dyn Ljm>, entry: Arc<DeviceEntry>) -> Self {
        Self { sdk, entry }
    }

    pub fn entry(&self) -> &Arc<DeviceEntry> {
        &self.entry
    }

    /// Open the device; fewer than three selectors opens any device.
    pub fn open(&self, params: &[Param]) -> Result<()> {
        let spec = match params {
            [device_type, connection_type, identifier, ..] => Some(OpenSpec::new(
                device_type.to_text(),
                connection_type.to_text(),
                identifier.to_text(),
            )),
            _ => None,
        };
        self.entry.open(self.sdk.as_ref(), spec.as_ref()).map(|_| ())
    }

    /// Connection report for the open handle.
    pub fn info(&self) -> Result<String> {
        let slot = self.entry.lock();
        let handle = (*slot).ok_or(ChannelError::DeviceNotOpen(self.entry.channel_id()))?;
        let info = self.sdk.handle_info(handle)?;
        Ok(diag::device_info_report(&info))
    }

    pub fn read_register(&self, register: &RegisterRef) -> Result<Reply> {
        let (address, ty) = register.resolve(self.sdk.as_ref())?;
        let slot = self.entry.lock();
        let handle = (*slot).ok_or(ChannelError::DeviceNotOpen(self.entry.channel_id()))?;
        let reply = if ty == RegisterType::String {
            self.sdk.read_string(handle, address).map(Reply::Text)
        } else {
            self.sdk.read_value(handle, address, ty).map(Reply::Float)
        };
        reply.map_err(|e| ChannelError::at(e, address))
    }

    pub fn write_register(&self, register: &RegisterRef, value: &Param) -> Result<()> {
        let (address, ty) = register.resolve(self.sdk.as_ref())?;
        let slot = self.entry.lock();
        let handle = (*slot).ok_or(ChannelError::DeviceNotOpen(self.entry.channel_id()))?;
        let written = if ty == RegisterType::String {
            let text = truncate_to_string_capacity(value.to_text());
            self.sdk.write_string(handle, address, &text)
        } else {
            self.sdk.write_value(handle, address, ty, value.to_float())
        };
        written.map_err(|e| ChannelError::at(e, address))
    }
}

impl Channel for DeviceChannel {
    fn setup(&mut self, _ctx: &mut Context<'_>, params: &[Param]) -> Result<()> {
        self.open(params)
    }

    fn read(&mut self, _ctx: &mut Context<'_>, params: &[Param]) -> Result<Reply> {
        let register = params.first().ok_or(ChannelError::MissingParameter("register"))?;
        self.read_register(&RegisterRef::from_param(register))
    }

    fn write(&mut self, _ctx: &mut Context<'_>, params: &[Param]) -> Result<Reply> {
        let [register, value, ..] = params else {
            return Err(ChannelError::MissingParameter("value"));
        };
        self.write_register(&RegisterRef::from_param(register), value)?;
        Ok(Reply::Empty)
    }
}

struct RegisterClass(LjmModule);

impl ChannelClass for RegisterClass {
    fn name(&self) -> &'static str {
        "ljmreg"
    }

    fn help(&self) -> &'static str {
        REGISTER_HELP
    }

    fn create(&self, _id: ChannelId, _params: &[Param]) -> Result<Box<dyn Channel>> {
        Ok(Box::new(RegisterChannel {
            entry: RegisterEntry::new(
                Arc::clone(&self.0.sdk),
                Arc::clone(&self.0.registry),
                self.0.options,
            ),
        }))
    }
}

struct RegisterChannel {
    entry: RegisterEntry,
}

impl RegisterChannel {
    fn config(ctx: &Context<'_>, device: &Param, rest: &[Param]) -> Result<RegisterConfig> {
        let device = ctx
            .channel_id(device)
            .ok_or_else(|| ChannelError::NotFound(device.to_text()))?;
        let mut config = match rest.first() {
            Some(register) => RegisterConfig::new(device, RegisterRef::from_param(register)),
            None => return Err(ChannelError::MissingParameter("register")),
        };
        if let Some(token) = rest.get(1) {
            let token = token.to_text();
            match RegisterType::from_override_token(&token) {
                Some(ty) => config = config.with_type(ty),
                None => debug!(%token, "type token not recognized, keeping inferred type"),
            }
        }
        if let Some(length) = rest.get(2) {
            config = config.with_length_register(RegisterRef::from_param(length));
        }
        Ok(config)
    }
}

impl Channel for RegisterChannel {
    fn setup(&mut self, ctx: &mut Context<'_>, params: &[Param]) -> Result<()> {
        let [device, rest @ ..] = params else {
            warn!("ljmreg setup needs a device channel and a register, ignoring");
            return Ok(());
        };
        if rest.is_empty() {
            warn!("ljmreg setup needs a device channel and a register, ignoring");
            return Ok(());
        }
        match Self::config(ctx, device, rest) {
            Ok(config) => self.entry.configure(&config),
            Err(e) => Err(self.entry.mark_unusable(e)),
        }
    }

    fn read(&mut self, _ctx: &mut Context<'_>, _params: &[Param]) -> Result<Reply> {
        self.entry.read().map(Reply::from)
    }

    /// With no value, read the register and publish the result to links.
    fn write(&mut self, ctx: &mut Context<'_>, params: &[Param]) -> Result<Reply> {
        match params.first() {
            Some(value) => {
                self.entry.write(value)?;
                Ok(Reply::Empty)
            }
            None => {
                let value = self.entry.read()?;
                let param = Param::from(value);
                ctx.publish(param.clone());
                Ok(Reply::from(param))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labjack_sdk::{MockCall, MockLjm, MockValue};

    fn host() -> (Arc<MockLjm>, ChannelHost, Arc<DeviceRegistry>) {
        let sdk = Arc::new(MockLjm::t7());
        let mut host = ChannelHost::new();
        let registry = install(&mut host, sdk.clone(), RegisterOptions::default());
        (sdk, host, registry)
    }

    fn run(host: &mut ChannelHost, lines: &[&str]) {
        for line in lines {
            host.execute_line(line).unwrap();
        }
    }

    #[test]
    fn device_setup_with_selectors() {
        let (sdk, mut host, registry) = host();
        run(&mut host, &["create ljmdev dev", "setup dev LJM_dtT7 LJM_ctUSB ANY"]);
        assert_eq!(
            sdk.calls(),
            vec![MockCall::Open(OpenSpec::new("LJM_dtT7", "LJM_ctUSB", "ANY"))]
        );
        assert!(registry.devices()[0].handle().is_some());
    }

    #[test]
    fn device_setup_with_two_params_uses_wildcards() {
        let (sdk, mut host, _) = host();
        run(&mut host, &["create ljmdev dev", "setup dev LJM_dtT7 LJM_ctUSB"]);
        assert_eq!(sdk.calls(), vec![MockCall::Open(OpenSpec::any())]);
    }

    #[test]
    fn ad_hoc_register_access() {
        let (sdk, mut host, _) = host();
        run(&mut host, &["create ljmdev dev", "setup dev", "write dev DAC0 1.5"]);
        assert_eq!(sdk.value(1000), Some(MockValue::Number(1.5)));
        assert_eq!(
            host.execute_line("read dev 1000").unwrap(),
            Some(Reply::Float(1.5))
        );
        run(&mut host, &["write dev DEVICE_NAME_DEFAULT bench-7"]);
        assert_eq!(
            host.execute_line("read dev DEVICE_NAME_DEFAULT").unwrap(),
            Some(Reply::Text("bench-7".into()))
        );
        assert_eq!(
            host.execute_line("write dev DAC0"),
            Err(ChannelError::MissingParameter("value"))
        );
    }

    #[test]
    fn device_info_needs_an_open_handle() {
        let sdk: Arc<dyn Ljm> = Arc::new(MockLjm::t7());
        let registry = DeviceRegistry::new();
        let dev = DeviceChannel::new(sdk, registry.register_device(ChannelId(1)));
        assert_eq!(dev.info(), Err(ChannelError::DeviceNotOpen(ChannelId(1))));
        dev.open(&[]).unwrap();
        let report = dev.info().unwrap();
        assert!(report.contains("serialNumber: 470000001"));
    }

    #[test]
    fn register_setup_by_device_name() {
        let (_, mut host, _) = host();
        run(
            &mut host,
            &[
                "create ljmdev dev",
                "setup dev",
                "create ljmreg r",
                "setup r dev AIN1",
                "write r 0.25",
            ],
        );
        assert_eq!(host.execute_line("read r").unwrap(), Some(Reply::Float(0.25)));
    }

    #[test]
    fn unknown_device_leaves_register_unusable() {
        let (_, mut host, _) = host();
        run(&mut host, &["create ljmreg r"]);
        assert_eq!(
            host.execute_line("setup r nodev AIN0"),
            Err(ChannelError::NotFound("nodev".into()))
        );
        assert_eq!(host.execute_line("read r"), Err(ChannelError::NotConfigured));
        assert_eq!(host.execute_line("write r 1"), Err(ChannelError::NotConfigured));
    }

    #[test]
    fn auto_type_token_keeps_inferred_type() {
        let (sdk, mut host, _) = host();
        run(
            &mut host,
            &[
                "create ljmdev dev",
                "setup dev",
                "create ljmreg r",
                "setup r dev FIO0 AUTO",
                "write r 1.7",
            ],
        );
        assert_eq!(sdk.value(2000), Some(MockValue::Number(1.0)));
    }

    #[test]
    fn help_text_per_class() {
        let (_, mut host, _) = host();
        let Some(Reply::Text(text)) = host.execute_line("help ljmreg").unwrap() else {
            unreachable!("help returns text");
        };
        assert!(text.contains("length_register"));
    }
}
