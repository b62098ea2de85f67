use rand::{rngs::StdRng, Rng};
use redbench_common::append_command;

/// Produces the requests a worker sends.
///
/// Each call appends exactly one encoded request to `buf`. Implementations are
/// shared by every worker of a run, so any state must be safe for concurrent
/// use; randomness comes from the calling worker's own `rng`.
pub trait Workload: Send + Sync {
    fn append_request(&self, buf: &mut Vec<u8>, rng: &mut StdRng);
}

impl<F> Workload for F
where
    F: Fn(&mut Vec<u8>, &mut StdRng) + Send + Sync,
{
    fn append_request(&self, buf: &mut Vec<u8>, rng: &mut StdRng) {
        self(buf, rng)
    }
}

/// Commands the command line can benchmark by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Set,
    Get,
    GetSet,
    Incr,
    Decr,
    MSet,
    MGet,
    HSet,
    HGet,
    HDel,
    HMSet,
    HMGet,
    HKeys,
    HVals,
    HGetAll,
    LPush,
    RPush,
    LPop,
    RPop,
    LRange,
    SAdd,
    SPop,
    SMembers,
    SIsMember,
    ZAdd,
    ZRem,
}

const COMMANDS: &[(&str, Command)] = &[
    ("ping", Command::Ping),
    ("set", Command::Set),
    ("get", Command::Get),
    ("getset", Command::GetSet),
    ("incr", Command::Incr),
    ("decr", Command::Decr),
    ("mset", Command::MSet),
    ("mget", Command::MGet),
    ("hset", Command::HSet),
    ("hget", Command::HGet),
    ("hdel", Command::HDel),
    ("hmset", Command::HMSet),
    ("hmget", Command::HMGet),
    ("hkeys", Command::HKeys),
    ("hvals", Command::HVals),
    ("hgetall", Command::HGetAll),
    ("lpush", Command::LPush),
    ("rpush", Command::RPush),
    ("lpop", Command::LPop),
    ("rpop", Command::RPop),
    ("lrange", Command::LRange),
    ("sadd", Command::SAdd),
    ("spop", Command::SPop),
    ("smembers", Command::SMembers),
    ("sismember", Command::SIsMember),
    ("zadd", Command::ZAdd),
    ("zrem", Command::ZRem),
];

impl Command {
    /// Case-insensitive lookup by command name.
    pub fn from_name(name: &str) -> Option<Self> {
        COMMANDS
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, c)| c)
    }

    pub fn as_name(&self) -> &'static str {
        COMMANDS
            .iter()
            .find(|(_, c)| c == self)
            .map(|&(n, _)| n)
            .unwrap_or("unknown")
    }

    pub fn all() -> impl Iterator<Item = Command> {
        COMMANDS.iter().map(|&(_, c)| c)
    }
}

/// Random keys and values for a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    /// Keys are drawn from `0..keys`.
    pub keys: u64,
    /// Hash fields and set members are drawn from `0..fields`.
    pub fields: u64,
    pub value: Vec<u8>,
}

impl KeySpace {
    pub fn new(keys: u64, fields: u64, value_size: usize) -> Self {
        Self {
            keys: keys.max(1),
            fields: fields.max(1),
            value: vec![b'A'; value_size],
        }
    }
}

/// Workload that issues one named command against random keys.
#[derive(Debug, Clone)]
pub struct CommandWorkload {
    command: Command,
    space: KeySpace,
}

impl CommandWorkload {
    pub fn new(command: Command, space: KeySpace) -> Self {
        Self { command, space }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    fn key(&self, prefix: &str, rng: &mut StdRng) -> String {
        format!("{prefix}:{:012}", rng.gen_range(0..self.space.keys))
    }

    fn field(&self, rng: &mut StdRng) -> String {
        format!("{:014}", rng.gen_range(0..self.space.fields))
    }
}

impl Workload for CommandWorkload {
    fn append_request(&self, buf: &mut Vec<u8>, rng: &mut StdRng) {
        let value: &[u8] = &self.space.value;
        match self.command {
            Command::Ping => append_command(buf, ["PING"]),
            Command::Set => {
                let key = self.key("mystring", rng);
                append_command(buf, [b"SET".as_slice(), key.as_bytes(), value]);
            }
            Command::Get => append_command(buf, ["GET", self.key("mystring", rng).as_str()]),
            Command::GetSet => {
                let key = self.key("mystring", rng);
                append_command(buf, [b"GETSET".as_slice(), key.as_bytes(), value]);
            }
            Command::Incr => append_command(buf, ["INCR", self.key("mynum", rng).as_str()]),
            Command::Decr => append_command(buf, ["DECR", self.key("mynum", rng).as_str()]),
            Command::MSet => {
                let keys: [String; 3] = std::array::from_fn(|_| self.key("mystring", rng));
                append_command(
                    buf,
                    [
                        b"MSET".as_slice(),
                        keys[0].as_bytes(),
                        value,
                        keys[1].as_bytes(),
                        value,
                        keys[2].as_bytes(),
                        value,
                    ],
                );
            }
            Command::MGet => {
                let keys: [String; 3] = std::array::from_fn(|_| self.key("mystring", rng));
                append_command(buf, ["MGET", keys[0].as_str(), keys[1].as_str(), keys[2].as_str()]);
            }
            Command::HSet => {
                let key = self.key("myhash", rng);
                let field = format!("field:{}", self.field(rng));
                append_command(buf, [b"HSET".as_slice(), key.as_bytes(), field.as_bytes(), value]);
            }
            Command::HGet => {
                let key = self.key("myhash", rng);
                let field = format!("field:{}", self.field(rng));
                append_command(buf, ["HGET", key.as_str(), field.as_str()]);
            }
            Command::HDel => {
                let key = self.key("myhash", rng);
                let field = format!("field:{}", self.field(rng));
                append_command(buf, ["HDEL", key.as_str(), field.as_str()]);
            }
            Command::HMSet => {
                let key = self.key("myhash", rng);
                let fields: [String; 3] = std::array::from_fn(|_| format!("field:{}", self.field(rng)));
                append_command(
                    buf,
                    [
                        b"HMSET".as_slice(),
                        key.as_bytes(),
                        fields[0].as_bytes(),
                        value,
                        fields[1].as_bytes(),
                        value,
                        fields[2].as_bytes(),
                        value,
                    ],
                );
            }
            Command::HMGet => {
                let key = self.key("myhash", rng);
                let fields: [String; 3] = std::array::from_fn(|_| format!("field:{}", self.field(rng)));
                append_command(buf, ["HMGET", key.as_str(), fields[0].as_str(), fields[1].as_str(), fields[2].as_str()]);
            }
            Command::HKeys => append_command(buf, ["HKEYS", self.key("myhash", rng).as_str()]),
            Command::HVals => append_command(buf, ["HVALS", self.key("myhash", rng).as_str()]),
            Command::HGetAll => append_command(buf, ["HGETALL", self.key("myhash", rng).as_str()]),
            Command::LPush => {
                let key = self.key("mylist", rng);
                append_command(buf, [b"LPUSH".as_slice(), key.as_bytes(), value]);
            }
            Command::RPush => {
                let key = self.key("mylist", rng);
                append_command(buf, [b"RPUSH".as_slice(), key.as_bytes(), value]);
            }
            Command::LPop => append_command(buf, ["LPOP", self.key("mylist", rng).as_str()]),
            Command::RPop => append_command(buf, ["RPOP", self.key("mylist", rng).as_str()]),
            Command::LRange => append_command(buf, ["LRANGE", self.key("mylist", rng).as_str(), "0", "1000"]),
            Command::SAdd => {
                let key = self.key("myset", rng);
                append_command(buf, ["SADD", key.as_str(), self.field(rng).as_str()]);
            }
            Command::SPop => append_command(buf, ["SPOP", self.key("myset", rng).as_str()]),
            Command::SMembers => append_command(buf, ["SMEMBERS", self.key("myset", rng).as_str()]),
            Command::SIsMember => {
                let key = self.key("myset", rng);
                append_command(buf, ["SISMEMBER", key.as_str(), self.field(rng).as_str()]);
            }
            Command::ZAdd => {
                let key = self.key("mysortedset", rng);
                let score = rng.gen_range(0..self.space.keys).to_string();
                append_command(buf, ["ZADD", key.as_str(), score.as_str(), self.field(rng).as_str()]);
            }
            Command::ZRem => {
                let key = self.key("mysortedset", rng);
                append_command(buf, ["ZREM", key.as_str(), self.field(rng).as_str()]);
            }
        }
    }
}
