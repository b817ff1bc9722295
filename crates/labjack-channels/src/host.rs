//! Channel host: named channel instances, command dispatch and link fan-out.

use crate::{ChannelError, MetricsHub, Param, Reply, Result};
use core::fmt;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

/// Link hops followed for one command before fan-out stops.
pub const MAX_LINK_DEPTH: usize = 16;

/// Host-assigned channel identifier. `0` never names a channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-command view of the host handed to a channel.
pub struct Context<'a> {
    names: &'a HashMap<String, ChannelId>,
    published: Vec<Param>,
}

impl<'a> Context<'a> {
    fn new(names: &'a HashMap<String, ChannelId>) -> Self {
        Self {
            names,
            published: Vec::new(),
        }
    }

    /// Resolve a channel reference. An exact channel name wins; otherwise a
    /// token that is entirely a non-zero integer is taken as an id.
    pub fn channel_id(&self, param: &Param) -> Option<ChannelId> {
        let text = param.to_text();
        if let Some(id) = self.names.get(&text) {
            return Some(*id);
        }
        let id = match param {
            Param::Int(v) => u32::try_from(*v).ok(),
            _ => text.trim().parse::<u32>().ok(),
        };
        id.filter(|&id| id != 0).map(ChannelId)
    }

    /// Queue a value for every channel linked to the current one.
    pub fn publish(&mut self, value: Param) {
        self.published.push(value);
    }
}

/// Capabilities of one channel instance.
pub trait Channel: Send {
    fn setup(&mut self, ctx: &mut Context<'_>, params: &[Param]) -> Result<()>;

    fn read(&mut self, ctx: &mut Context<'_>, params: &[Param]) -> Result<Reply>;

    fn write(&mut self, ctx: &mut Context<'_>, params: &[Param]) -> Result<Reply>;
}

/// A creatable kind of channel, registered under a class name.
pub trait ChannelClass: Send {
    fn name(&self) -> &'static str;

    fn help(&self) -> &'static str;

    /// Build a new instance. `params` excludes the instance name.
    fn create(&self, id: ChannelId, params: &[Param]) -> Result<Box<dyn Channel>>;
}

/// Host commands, in their typed form.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Help {
        target: Option<String>,
    },
    Create {
        class: String,
        name: String,
        params: Vec<Param>,
    },
    Setup {
        channel: String,
        params: Vec<Param>,
    },
    Read {
        channel: String,
        params: Vec<Param>,
    },
    Write {
        channel: String,
        params: Vec<Param>,
    },
    Link {
        from: String,
        to: String,
    },
}

struct Instance {
    name: String,
    class: &'static str,
    channel: Box<dyn Channel>,
}

#[derive(Clone, Copy)]
enum Op {
    Setup,
    Read,
    Write,
}

/// Owns channel classes and instances and routes commands between them.
pub struct ChannelHost {
    classes: HashMap<&'static str, Box<dyn ChannelClass>>,
    instances: HashMap<ChannelId, Instance>,
    names: HashMap<String, ChannelId>,
    links: HashMap<ChannelId, Vec<ChannelId>>,
    next_id: u32,
    metrics: Option<MetricsHub>,
}

impl Default for ChannelHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelHost {
    /// A host with only the built-in `mem` class.
    pub fn new() -> Self {
        let mut host = Self {
            classes: HashMap::new(),
            instances: HashMap::new(),
            names: HashMap::new(),
            links: HashMap::new(),
            next_id: 1,
            metrics: None,
        };
        host.register_class(Box::new(MemoryClass));
        host
    }

    pub fn with_metrics(mut self, metrics: MetricsHub) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn metrics(&self) -> Option<&MetricsHub> {
        self.metrics.as_ref()
    }

    pub fn register_class(&mut self, class: Box<dyn ChannelClass>) {
        self.classes.insert(class.name(), class);
    }

    pub fn channel_id(&self, name: &str) -> Option<ChannelId> {
        self.names.get(name).copied()
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.instances.keys().copied().collect();
        ids.sort();
        ids.iter()
            .filter_map(|id| self.instances.get(id).map(|i| i.name.clone()))
            .collect()
    }

    pub fn execute(&mut self, command: Command) -> Result<Reply> {
        match command {
            Command::Help { target } => self.help(target.as_deref()),
            Command::Create {
                class,
                name,
                params,
            } => self.create(&class, &name, &params).map(|_| Reply::Empty),
            Command::Setup { channel, params } => self.dispatch(&channel, Op::Setup, &params),
            Command::Read { channel, params } => self.dispatch(&channel, Op::Read, &params),
            Command::Write { channel, params } => self.dispatch(&channel, Op::Write, &params),
            Command::Link { from, to } => self.link(&from, &to).map(|_| Reply::Empty),
        }
    }

    /// Parse and run one line of the text command language.
    pub fn execute_line(&mut self, line: &str) -> Result<Option<Reply>> {
        match parse_command(line)? {
            Some(cmd) => self.execute(cmd).map(Some),
            None => Ok(None),
        }
    }

    /// Run a command script, stopping at the first failing line.
    pub fn run_script(&mut self, script: &str) -> Result<Vec<Reply>> {
        let mut replies = Vec::new();
        for (n, line) in script.lines().enumerate() {
            match self.execute_line(line) {
                Ok(Some(reply)) => replies.push(reply),
                Ok(None) => {}
                Err(e) => {
                    warn!(line = n + 1, error = %e, "script stopped");
                    return Err(e);
                }
            }
        }
        Ok(replies)
    }

    pub fn create(&mut self, class: &str, name: &str, params: &[Param]) -> Result<ChannelId> {
        if self.names.contains_key(name) {
            return Err(ChannelError::NameTaken(name.to_string()));
        }
        let class = self
            .classes
            .get(class)
            .ok_or_else(|| ChannelError::UnknownClass(class.to_string()))?;
        let id = ChannelId(self.next_id);
        let channel = class.create(id, params)?;
        self.next_id += 1;
        self.instances.insert(
            id,
            Instance {
                name: name.to_string(),
                class: class.name(),
                channel,
            },
        );
        self.names.insert(name.to_string(), id);
        if let Some(m) = &self.metrics {
            m.channels.inc();
        }
        debug!(class = class.name(), name, %id, "channel created");
        Ok(id)
    }

    /// Route values published by `from` into `to` as writes.
    pub fn link(&mut self, from: &str, to: &str) -> Result<()> {
        let from = self.lookup(from)?;
        let to = self.lookup(to)?;
        self.links.entry(from).or_default().push(to);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<ChannelId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| ChannelError::UnknownChannel(name.to_string()))
    }

    fn help(&self, target: Option<&str>) -> Result<Reply> {
        let Some(target) = target else {
            let mut names: Vec<_> = self.classes.keys().copied().collect();
            names.sort_unstable();
            return Ok(Reply::Text(format!("channel classes: {}", names.join(" "))));
        };
        let class = match self.classes.get(target) {
            Some(class) => class,
            None => {
                let id = self.lookup(target)?;
                let class = self.instances.get(&id).map(|i| i.class).unwrap_or_default();
                self.classes
                    .get(class)
                    .ok_or_else(|| ChannelError::UnknownClass(class.to_string()))?
            }
        };
        Ok(Reply::Text(class.help().to_string()))
    }

    fn dispatch(&mut self, name: &str, op: Op, params: &[Param]) -> Result<Reply> {
        let id = self.lookup(name)?;
        let (result, published) = self.run(id, op, params);
        self.record(op, &result, published.len());
        self.fan_out(id, published);
        result
    }

    fn run(&mut self, id: ChannelId, op: Op, params: &[Param]) -> (Result<Reply>, Vec<Param>) {
        let Some(instance) = self.instances.get_mut(&id) else {
            return (Err(ChannelError::UnknownChannel(id.to_string())), Vec::new());
        };
        let mut ctx = Context::new(&self.names);
        let result = match op {
            Op::Setup => instance.channel.setup(&mut ctx, params).map(|_| Reply::Empty),
            Op::Read => instance.channel.read(&mut ctx, params),
            Op::Write => instance.channel.write(&mut ctx, params),
        };
        (result, ctx.published)
    }

    /// Deliver published values breadth-first along links. A failing target
    /// is logged and skipped so one bad channel cannot stall the others.
    fn fan_out(&mut self, origin: ChannelId, published: Vec<Param>) {
        let mut queue: VecDeque<(ChannelId, Param, usize)> =
            published.into_iter().map(|p| (origin, p, 0)).collect();
        while let Some((from, value, depth)) = queue.pop_front() {
            if depth >= MAX_LINK_DEPTH {
                warn!(%from, "link depth limit reached, dropping value");
                continue;
            }
            let targets = self.links.get(&from).cloned().unwrap_or_default();
            for target in targets {
                let (result, next) = self.run(target, Op::Write, std::slice::from_ref(&value));
                self.record(Op::Write, &result, next.len());
                if let Err(e) = result {
                    warn!(%from, %target, error = %e, "linked write failed");
                }
                queue.extend(next.into_iter().map(|p| (target, p, depth + 1)));
            }
        }
    }

    fn record(&self, op: Op, result: &Result<Reply>, published: usize) {
        let Some(m) = &self.metrics else {
            return;
        };
        match op {
            Op::Read => m.reads.inc(),
            Op::Write => m.writes.inc(),
            Op::Setup => {}
        }
        m.publishes.inc_by(published as u64);
        if let Err(e) = result {
            m.errors.inc();
            if matches!(e, ChannelError::Vendor { .. }) {
                m.vendor_errors.inc();
            }
        }
    }
}

/// Split a command line into tokens. Double quotes group words; `#` starts a comment.
fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '#' {
            break;
        } else if c == '"' {
            chars.next();
            let mut token = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some(escaped) => token.push(escaped),
                        None => return Err(ChannelError::Parse("dangling escape".into())),
                    },
                    Some(ch) => token.push(ch),
                    None => return Err(ChannelError::Parse("unterminated quote".into())),
                }
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                token.push(ch);
                chars.next();
            }
            tokens.push(token);
        }
    }
    Ok(tokens)
}

/// Parse one line of the text command language. Blank lines and comments yield `None`.
///
/// ```text
/// create ljmdev dev
/// setup reg dev AIN0 LJM_FLOAT32
/// write reg 2.5
/// link reg log
/// ```
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let tokens = tokenize(line)?;
    let mut it = tokens.into_iter();
    let Some(verb) = it.next() else {
        return Ok(None);
    };
    let mut next = |what: &'static str| it.next().ok_or(ChannelError::MissingParameter(what));
    let command = match verb.as_str() {
        "help" => Command::Help {
            target: next("target").ok(),
        },
        "create" => {
            let class = next("class")?;
            let name = next("name")?;
            Command::Create {
                class,
                name,
                params: it.map(Param::Text).collect(),
            }
        }
        "setup" => Command::Setup {
            channel: next("channel")?,
            params: it.map(Param::Text).collect(),
        },
        "read" => Command::Read {
            channel: next("channel")?,
            params: it.map(Param::Text).collect(),
        },
        "write" => Command::Write {
            channel: next("channel")?,
            params: it.map(Param::Text).collect(),
        },
        "link" => {
            let from = next("from")?;
            let to = next("to")?;
            Command::Link { from, to }
        }
        other => return Err(ChannelError::Parse(format!("unknown command {other:?}"))),
    };
    Ok(Some(command))
}

struct MemoryClass;

impl ChannelClass for MemoryClass {
    fn name(&self) -> &'static str {
        "mem"
    }

    fn help(&self) -> &'static str {
        "mem channel - holds the last value written.\r\n\
         create mem newname\r\n\
         setup newname | initial_value\r\n\
         write newname value #store value\r\n\
         read newname #return stored value\r\n"
    }

    fn create(&self, _id: ChannelId, params: &[Param]) -> Result<Box<dyn Channel>> {
        Ok(Box::new(Memory {
            value: params.first().cloned(),
        }))
    }
}

struct Memory {
    value: Option<Param>,
}

impl Channel for Memory {
    fn setup(&mut self, _ctx: &mut Context<'_>, params: &[Param]) -> Result<()> {
        if let Some(p) = params.first() {
            self.value = Some(p.clone());
        }
        Ok(())
    }

    fn read(&mut self, _ctx: &mut Context<'_>, _params: &[Param]) -> Result<Reply> {
        Ok(self.value.clone().map(Reply::from).unwrap_or_default())
    }

    fn write(&mut self, _ctx: &mut Context<'_>, params: &[Param]) -> Result<Reply> {
        if let Some(p) = params.first() {
            self.value = Some(p.clone());
        }
        Ok(Reply::Empty)
    }
}
