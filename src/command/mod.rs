//! Command identity, the per-command key-position table, and the
//! blocked-command policy.
//!
//! Routing is decided entirely from static tables built once at startup:
//! which argument carries the routing key (first argument unless listed
//! otherwise), and which commands can never work against a sharded
//! keyspace and are rejected before any network I/O.

use crate::cluster::slot::key_slot;
use crate::error::{ClientError, Result};
use crate::protocol::types::encode_request;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// A single command invocation: normalized name plus raw argument bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<Bytes>,
}

impl Command {
    /// Build a command. The name is normalized to uppercase; an empty
    /// name cannot be dispatched anywhere and fails immediately.
    pub fn new(name: &str, args: Vec<Bytes>) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(ClientError::Config(
                "Unable to determine command to use".to_string(),
            ));
        }
        Ok(Self {
            name: name.trim().to_uppercase(),
            args,
        })
    }

    /// The ASKING handshake sent before a command that follows an ASK
    /// redirect.
    pub fn asking() -> Self {
        Self {
            name: "ASKING".to_string(),
            args: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Encode as a RESP request frame
    pub fn encode(&self) -> Bytes {
        encode_request(&self.name, &self.args)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// How a command's routing key is found among its arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyRule {
    /// The argument at this index is the single routing key
    Single(usize),
    /// Every argument is a key; the first is canonical
    EveryArg,
    /// Arguments are key-value pairs; every even index is a key
    Pairs,
    /// Script command: the argument at this index declares how many keys
    /// immediately follow it
    Numkeys(usize),
    /// The command carries no key and cannot be routed
    None,
}

struct PolicyTables {
    key_rules: HashMap<&'static str, KeyRule>,
    blocked: HashSet<&'static str>,
}

fn tables() -> &'static PolicyTables {
    static TABLES: OnceLock<PolicyTables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut key_rules: HashMap<&'static str, KeyRule> = HashMap::new();

        // Multi-key commands where every argument is a key
        for name in ["DEL", "EXISTS", "UNLINK", "TOUCH", "MGET", "WATCH", "PFCOUNT",
                     "PFMERGE", "SUNION", "SINTER", "SDIFF"] {
            key_rules.insert(name, KeyRule::EveryArg);
        }

        // Key-value pair lists
        for name in ["MSET", "MSETNX"] {
            key_rules.insert(name, KeyRule::Pairs);
        }

        // EVAL carries `script numkeys key...`; it routes by its declared
        // keys, never by the script text
        key_rules.insert("EVAL", KeyRule::Numkeys(1));

        // Commands with no key-bearing argument; they cannot be routed to
        // a single owner and are rejected before any I/O
        for name in ["PING", "ECHO", "AUTH", "HELLO", "TIME", "INFO", "COMMAND", "CLIENT",
                     "CLUSTER", "CONFIG", "DBSIZE", "KEYS", "SCAN", "SLOWLOG", "WAIT",
                     "LASTSAVE", "SAVE", "BGSAVE", "BGREWRITEAOF", "RANDOMKEY",
                     "ASKING", "READONLY", "READWRITE", "MEMORY", "LATENCY",
                     "DEBUG", "MONITOR", "RESET", "LOLWUT", "MULTI", "EXEC",
                     "DISCARD", "UNWATCH"] {
            key_rules.insert(name, KeyRule::None);
        }

        // Everything else defaults to KeyRule::Single(0): first argument.

        // Commands that are inherently incompatible with a sharded
        // keyspace: topology-mutating administration, server-wide commands,
        // single-authoritative-connection commands, cross-node atomics.
        // Read-only CLUSTER subcommands stay allowed (they fail routing as
        // keyless, not policy).
        let mut blocked: HashSet<&'static str> = HashSet::new();
        for name in ["CLIENT SETNAME", "SENTINEL", "SHUTDOWN", "SLAVEOF",
                     "REPLICAOF", "EVALSHA", "SCRIPT", "MOVE", "BITOP",
                     "SELECT", "CLUSTER FAILOVER", "CLUSTER FORGET",
                     "CLUSTER MEET", "CLUSTER RESET", "CLUSTER SET-CONFIG-EPOCH",
                     "CLUSTER SETSLOT", "FLUSHALL", "FLUSHDB", "SWAPDB"] {
            blocked.insert(name);
        }

        PolicyTables { key_rules, blocked }
    })
}

/// Check a command against the blocked-command policy.
///
/// Matches the bare command name, or the `NAME SUBCOMMAND` pair for
/// commands whose first argument selects a subcommand.
pub fn check_blocked(command: &Command) -> Result<()> {
    let tables = tables();
    let name = command.name();

    let two_word = command
        .args()
        .first()
        .and_then(|arg| std::str::from_utf8(arg).ok())
        .map(|sub| format!("{} {}", name, sub.to_uppercase()));

    let hit = tables.blocked.contains(name)
        || two_word
            .as_deref()
            .is_some_and(|pair| tables.blocked.contains(pair));

    if hit {
        return Err(ClientError::Config(format!(
            "Command '{}' is not possible to use in cluster mode",
            two_word.filter(|p| tables.blocked.contains(p.as_str())).unwrap_or_else(|| name.to_string())
        )));
    }
    Ok(())
}

/// Extract the routing keys for a command per the key-position table.
fn routing_keys(command: &Command) -> Result<Vec<&Bytes>> {
    let rule = tables()
        .key_rules
        .get(command.name())
        .copied()
        .unwrap_or(KeyRule::Single(0));

    let missing = || {
        ClientError::Config(
            "No way to dispatch this command to the cluster. Missing key.".to_string(),
        )
    };

    match rule {
        KeyRule::None => Err(missing()),
        KeyRule::Single(index) => {
            let key = command.args().get(index).ok_or_else(missing)?;
            Ok(vec![key])
        }
        KeyRule::EveryArg => {
            if command.args().is_empty() {
                return Err(missing());
            }
            Ok(command.args().iter().collect())
        }
        KeyRule::Pairs => {
            if command.args().is_empty() {
                return Err(missing());
            }
            Ok(command.args().iter().step_by(2).collect())
        }
        KeyRule::Numkeys(index) => {
            let count = command
                .args()
                .get(index)
                .and_then(|arg| std::str::from_utf8(arg).ok())
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|&n| n > 0)
                .ok_or_else(missing)?;
            let keys = command
                .args()
                .get(index + 1..index + 1 + count)
                .ok_or_else(missing)?;
            Ok(keys.iter().collect())
        }
    }
}

/// Resolve a command to its target slot.
///
/// Enforces the blocked-command policy, extracts the routing key(s), and
/// rejects multi-key commands whose keys span more than one slot. All of
/// this happens before any network I/O.
pub fn route_slot(command: &Command) -> Result<u16> {
    check_blocked(command)?;
    let keys = routing_keys(command)?;

    let slot = key_slot(keys[0]);
    for key in &keys[1..] {
        if key_slot(key) != slot {
            return Err(ClientError::Config(format!(
                "Keys of '{}' map to different slots; this operation is not possible across shards",
                command.name()
            )));
        }
    }
    Ok(slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(name: &str, args: &[&str]) -> Command {
        Command::new(name, args.iter().map(|a| Bytes::copy_from_slice(a.as_bytes())).collect())
            .unwrap()
    }

    #[test]
    fn test_empty_command_name() {
        let err = Command::new("", vec![]).unwrap_err();
        assert!(err.to_string().starts_with("Unable to determine command to use"));
        assert!(Command::new("   ", vec![]).is_err());
    }

    #[test]
    fn test_name_normalization_and_encode() {
        let c = cmd("set", &["foo", "bar"]);
        assert_eq!(c.name(), "SET");
        assert_eq!(
            c.encode(),
            Bytes::from("*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
        );
    }

    #[test]
    fn test_blocked_commands() {
        let blocked = [
            cmd("CLIENT", &["SETNAME", "conn-1"]),
            cmd("SENTINEL", &["MASTERS"]),
            cmd("SENTINEL", &["GET-MASTER-ADDR-BY-NAME", "m"]),
            cmd("SHUTDOWN", &[]),
            cmd("SLAVEOF", &["127.0.0.1", "7000"]),
            cmd("EVALSHA", &["abc123", "1", "foo"]),
            cmd("SCRIPT", &["LOAD", "return 1"]),
            cmd("SCRIPT", &["EXISTS", "abc123"]),
            cmd("SCRIPT", &["KILL"]),
            cmd("MOVE", &["foo", "1"]),
            cmd("BITOP", &["AND", "dest", "a", "b"]),
            cmd("SELECT", &["1"]),
            cmd("CLUSTER", &["FAILOVER"]),
            cmd("FLUSHALL", &[]),
        ];
        for c in blocked {
            let err = check_blocked(&c).unwrap_err();
            assert!(err.is_config(), "{} should be a config error", c.name());
        }
    }

    #[test]
    fn test_client_is_only_blocked_with_setname() {
        assert!(check_blocked(&cmd("CLIENT", &["GETNAME"])).is_ok());
        assert!(check_blocked(&cmd("CLIENT", &["SETNAME", "x"])).is_err());
    }

    #[test]
    fn test_route_slot_first_arg_default() {
        assert_eq!(route_slot(&cmd("GET", &["foo"])).unwrap(), 12182);
        assert_eq!(route_slot(&cmd("SET", &["foo", "bar"])).unwrap(), 12182);
        assert_eq!(route_slot(&cmd("HSET", &["bar", "f", "v"])).unwrap(), 5061);
    }

    #[test]
    fn test_route_slot_missing_key() {
        let err = route_slot(&cmd("GET", &[])).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("No way to dispatch this command to the cluster. Missing key."));

        // Keyless commands are unroutable by definition
        assert!(route_slot(&cmd("PING", &[])).is_err());
        assert!(route_slot(&cmd("INFO", &[])).is_err());
    }

    #[test]
    fn test_route_slot_multi_key_same_slot() {
        // Hash tags force co-location
        let slot = route_slot(&cmd("MGET", &["{user:1}a", "{user:1}b"])).unwrap();
        assert_eq!(slot, key_slot(b"user:1"));

        let slot = route_slot(&cmd("MSET", &["{u}a", "1", "{u}b", "2"])).unwrap();
        assert_eq!(slot, key_slot(b"u"));
    }

    #[test]
    fn test_eval_routes_by_declared_key() {
        // The script text must never be the routing key
        let slot = route_slot(&cmd("EVAL", &["return 1", "1", "foo"])).unwrap();
        assert_eq!(slot, key_slot(b"foo"));
        assert_ne!(slot, key_slot(b"return 1"));

        // Co-located declared keys route together
        let slot = route_slot(&cmd("EVAL", &["return 1", "2", "{u}a", "{u}b"])).unwrap();
        assert_eq!(slot, key_slot(b"u"));
    }

    #[test]
    fn test_eval_without_keys_is_unroutable() {
        assert!(route_slot(&cmd("EVAL", &["return 1", "0"])).is_err());
        assert!(route_slot(&cmd("EVAL", &["return 1"])).is_err());
        assert!(route_slot(&cmd("EVAL", &["return 1", "notanumber", "foo"])).is_err());
        // Fewer keys than declared
        assert!(route_slot(&cmd("EVAL", &["return 1", "2", "foo"])).is_err());
    }

    #[test]
    fn test_eval_cross_slot_rejected() {
        let err = route_slot(&cmd("EVAL", &["return 1", "2", "foo", "bar"])).unwrap_err();
        assert!(err.to_string().contains("not possible across shards"));
    }

    #[test]
    fn test_cluster_admin_mutations_blocked_reads_allowed() {
        for sub in ["FAILOVER", "FORGET", "MEET", "RESET", "SET-CONFIG-EPOCH", "SETSLOT"] {
            assert!(check_blocked(&cmd("CLUSTER", &[sub])).is_err(), "{}", sub);
        }
        // Read-only subcommands pass policy but are keyless and unroutable
        assert!(check_blocked(&cmd("CLUSTER", &["INFO"])).is_ok());
        assert!(check_blocked(&cmd("CLUSTER", &["SLOTS"])).is_ok());
        let err = route_slot(&cmd("CLUSTER", &["INFO"])).unwrap_err();
        assert!(err.to_string().starts_with("No way to dispatch"));
    }

    #[test]
    fn test_route_slot_cross_slot_rejected() {
        // foo -> 12182, bar -> 5061
        let err = route_slot(&cmd("MGET", &["foo", "bar"])).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("not possible across shards"));

        assert!(route_slot(&cmd("MSET", &["foo", "1", "bar", "2"])).is_err());
        assert!(route_slot(&cmd("DEL", &["foo", "bar"])).is_err());
    }

    #[test]
    fn test_asking_handshake_command() {
        let c = Command::asking();
        assert_eq!(c.name(), "ASKING");
        assert_eq!(c.encode(), Bytes::from("*1\r\n$6\r\nASKING\r\n"));
    }
}
