//! Station files: a YAML description of devices, registers and links,
//! compiled into the host commands that build it.

use crate::{parse_command, Command, Param, RegisterOptions, DEFAULT_MAX_BYTE_ARRAY_LEN};
use anyhow::{bail, ensure, Context};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct Station {
    /// Largest byte array a length register may ask for.
    #[serde(default)]
    pub max_byte_array_len: Option<usize>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub registers: Vec<RegisterSpec>,
    #[serde(default)]
    pub memories: Vec<String>,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub name: String,
    /// Selectors for the vendor open call; absent means any device.
    #[serde(default)]
    pub open: Option<OpenSelectors>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct OpenSelectors {
    pub device_type: String,
    pub connection_type: String,
    pub identifier: String,
}

/// A register given by numeric address or by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(untagged)]
pub enum RegisterKey {
    Address(u32),
    Name(String),
}

impl RegisterKey {
    fn to_param(&self) -> Param {
        match self {
            Self::Address(a) => Param::Int(i64::from(*a)),
            Self::Name(n) => Param::Text(n.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RegisterSpec {
    pub name: String,
    /// Name of a device in the same station.
    pub device: String,
    pub register: RegisterKey,
    /// Type override token such as `LJM_FLOAT32`; omitted or `AUTO` keeps
    /// the type reported by the library.
    #[serde(default, rename = "type")]
    pub ty: Option<String>,
    #[serde(default)]
    pub length_register: Option<RegisterKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    pub from: String,
    pub to: String,
}

impl Station {
    pub fn options(&self) -> RegisterOptions {
        RegisterOptions {
            max_byte_array_len: self.max_byte_array_len.unwrap_or(DEFAULT_MAX_BYTE_ARRAY_LEN),
        }
    }

    /// Check names and references before anything is created.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut names = HashSet::new();
        let all = self
            .devices
            .iter()
            .map(|d| &d.name)
            .chain(self.registers.iter().map(|r| &r.name))
            .chain(self.memories.iter());
        for name in all {
            ensure!(!name.trim().is_empty(), "empty channel name");
            ensure!(names.insert(name.as_str()), "duplicate channel name: {name}");
        }
        let devices: HashSet<_> = self.devices.iter().map(|d| d.name.as_str()).collect();
        for reg in &self.registers {
            if !devices.contains(reg.device.as_str()) {
                bail!("register {} refers to unknown device {}", reg.name, reg.device);
            }
            for key in std::iter::once(&reg.register).chain(reg.length_register.as_ref()) {
                if *key == RegisterKey::Address(0) {
                    bail!(
                        "register {}: address 0 cannot be given as a number, use its name",
                        reg.name
                    );
                }
            }
        }
        for link in &self.links {
            for end in [&link.from, &link.to] {
                ensure!(names.contains(end.as_str()), "link refers to unknown channel {end}");
            }
        }
        Ok(())
    }

    /// Register names in declaration order.
    pub fn register_names(&self) -> Vec<String> {
        self.registers.iter().map(|r| r.name.clone()).collect()
    }

    /// Host commands that build this station: devices, memories, registers, links.
    pub fn to_commands(&self) -> Vec<Command> {
        let mut out = Vec::new();
        for dev in &self.devices {
            out.push(Command::Create {
                class: "ljmdev".into(),
                name: dev.name.clone(),
                params: Vec::new(),
            });
            let params = match &dev.open {
                Some(sel) => vec![
                    Param::from(sel.device_type.as_str()),
                    Param::from(sel.connection_type.as_str()),
                    Param::from(sel.identifier.as_str()),
                ],
                None => Vec::new(),
            };
            out.push(Command::Setup {
                channel: dev.name.clone(),
                params,
            });
        }
        for mem in &self.memories {
            out.push(Command::Create {
                class: "mem".into(),
                name: mem.clone(),
                params: Vec::new(),
            });
        }
        for reg in &self.registers {
            out.push(Command::Create {
                class: "ljmreg".into(),
                name: reg.name.clone(),
                params: Vec::new(),
            });
            let mut params = vec![Param::from(reg.device.as_str()), reg.register.to_param()];
            if reg.ty.is_some() || reg.length_register.is_some() {
                params.push(Param::from(reg.ty.as_deref().unwrap_or("AUTO")));
            }
            if let Some(length) = &reg.length_register {
                params.push(length.to_param());
            }
            out.push(Command::Setup {
                channel: reg.name.clone(),
                params,
            });
        }
        for link in &self.links {
            out.push(Command::Link {
                from: link.from.clone(),
                to: link.to.clone(),
            });
        }
        out
    }
}

pub fn parse_station(raw: &str) -> anyhow::Result<Station> {
    let val: Value = serde_yaml::from_str(raw).context("parsing yaml")?;
    let station: Station = serde_yaml::from_value(val).context("decoding station")?;
    station.validate()?;
    Ok(station)
}

pub fn load_station_file(path: impl AsRef<Path>) -> anyhow::Result<Station> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading station: {}", path.display()))?;
    parse_station(&raw).with_context(|| format!("loading station: {}", path.display()))
}

/// Parse a command script, one command per line.
pub fn parse_script(text: &str) -> anyhow::Result<Vec<Command>> {
    let mut out = Vec::new();
    for (n, line) in text.lines().enumerate() {
        if let Some(cmd) = parse_command(line).with_context(|| format!("line {}", n + 1))? {
            out.push(cmd);
        }
    }
    Ok(out)
}

pub fn load_script(path: impl AsRef<Path>) -> anyhow::Result<Vec<Command>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading script: {}", path.display()))?;
    parse_script(&text).with_context(|| format!("parsing script: {}", path.display()))
}
