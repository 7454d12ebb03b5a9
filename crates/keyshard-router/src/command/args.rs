//! Argument shapes, one per command category
//!
//! Each shape is parsed from the raw argument list before any shard is
//! contacted. Parsing only borrows; the original arguments are what gets
//! forwarded (blocking pops excepted, see [`BlockingPopArgs::forward_args`]).

use keyshard_types::Value;

use crate::command::Aggregation;
use crate::error::RouterError;
use crate::types::{KeyPosition, NO_TIMEOUT, QUEUE_KEY};

fn key_at<'a>(command: &str, args: &'a [Value], position: KeyPosition) -> Result<&'a str, RouterError> {
    match args.get(position.index()) {
        Some(Value::Str(key)) => Ok(key),
        Some(other) => Err(RouterError::WrongKeyType {
            command: command.to_string(),
            position,
            found: other.type_name(),
        }),
        None => Err(RouterError::MissingKey {
            command: command.to_string(),
            position,
        }),
    }
}

/// Direct commands: `key, ...`
#[derive(Debug, Clone, Copy)]
pub struct KeyedArgs<'a> {
    pub key: &'a str,
    pub args: &'a [Value],
}

impl<'a> KeyedArgs<'a> {
    pub fn parse(command: &str, args: &'a [Value]) -> Result<Self, RouterError> {
        let key = key_at(command, args, KeyPosition::First)?;
        Ok(Self { key, args })
    }
}

/// Tag commands: `key{tag}, ...` or `[key{tag}, other{tag}, ...], ...`
///
/// The tag key only needs a `{`. Without a complete `{...}` it is routed by
/// the whole key, like any other key.
#[derive(Debug, Clone, Copy)]
pub struct TaggedArgs<'a> {
    /// The first argument or its first element
    pub tag_key: &'a str,
    pub args: &'a [Value],
}

impl<'a> TaggedArgs<'a> {
    pub fn parse(command: &str, args: &'a [Value]) -> Result<Self, RouterError> {
        let first = args.first().ok_or_else(|| RouterError::MissingKey {
            command: command.to_string(),
            position: KeyPosition::First,
        })?;

        let tag_key = match first {
            Value::Str(key) => Some(key.as_str()),
            Value::List(keys) => keys.first().and_then(Value::as_str),
            _ => None,
        };

        match tag_key {
            Some(tag_key) if tag_key.contains('{') => Ok(Self { tag_key, args }),
            _ => Err(RouterError::MissingTag {
                command: command.to_string(),
            }),
        }
    }
}

/// Field-indexed commands: `hash, key, ...`, routed by `key`
#[derive(Debug, Clone, Copy)]
pub struct FieldArgs<'a> {
    pub hash: &'a Value,
    pub key: &'a str,
    pub args: &'a [Value],
}

impl<'a> FieldArgs<'a> {
    pub fn parse(command: &str, args: &'a [Value]) -> Result<Self, RouterError> {
        let key = key_at(command, args, KeyPosition::Second)?;
        // key_at succeeded at index 1, so index 0 exists
        let hash = &args[0];
        Ok(Self { hash, key, args })
    }
}

/// Fixed-key commands: any arguments, including none
#[derive(Debug, Clone, Copy)]
pub struct QueueArgs<'a> {
    pub args: &'a [Value],
}

impl<'a> QueueArgs<'a> {
    pub fn parse(args: &'a [Value]) -> Self {
        Self { args }
    }

    /// Logical key every fixed-key command is routed by
    pub fn key(&self) -> &'static str {
        QUEUE_KEY
    }
}

/// Fan-out commands: `keys pattern` or `flushdb`
#[derive(Debug, Clone, Copy)]
pub struct FanOutArgs<'a> {
    /// The key pattern, for enumerating commands
    pub pattern: Option<&'a str>,
    pub args: &'a [Value],
}

impl<'a> FanOutArgs<'a> {
    pub fn parse(
        command: &str,
        aggregation: Aggregation,
        args: &'a [Value],
    ) -> Result<Self, RouterError> {
        let (pattern, expected) = match aggregation {
            Aggregation::Concat => (Some(key_at(command, args, KeyPosition::First)?), 1),
            Aggregation::Discard => (None, 0),
        };

        if args.len() > expected {
            return Err(RouterError::InvalidArgument {
                command: command.to_string(),
                reason: format!("expected {} argument(s), got {}", expected, args.len()),
            });
        }
        Ok(Self { pattern, args })
    }
}

/// Blocking pop timeout in seconds; zero blocks until an element arrives
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PopTimeout {
    Whole(u64),
    Fractional(f64),
}

impl PopTimeout {
    fn into_value(self) -> Value {
        match self {
            PopTimeout::Whole(secs) => Value::from(secs),
            PopTimeout::Fractional(secs) => Value::Float(secs),
        }
    }
}

/// Blocking pops: `key [, timeout]` with exactly one string key
#[derive(Debug, Clone, Copy)]
pub struct BlockingPopArgs<'a> {
    pub key: &'a str,
    pub timeout: PopTimeout,
}

impl<'a> BlockingPopArgs<'a> {
    pub fn parse(command: &str, args: &'a [Value]) -> Result<Self, RouterError> {
        let multiple_keys = || RouterError::MultipleKeys {
            command: command.to_string(),
        };

        let key = match args.first() {
            Some(Value::Str(key)) => key.as_str(),
            Some(_) => return Err(multiple_keys()),
            None => {
                return Err(RouterError::MissingKey {
                    command: command.to_string(),
                    position: KeyPosition::First,
                })
            }
        };

        // `blpop a b 0` would name two keys
        if args.len() > 2 {
            return Err(multiple_keys());
        }

        let invalid_timeout = |found: &Value| RouterError::InvalidArgument {
            command: command.to_string(),
            reason: format!("timeout must be a non-negative number of seconds (got {})", found),
        };

        let timeout = match args.get(1) {
            None | Some(Value::Nil) => PopTimeout::Whole(NO_TIMEOUT),
            Some(Value::Int(t)) if *t >= 0 => PopTimeout::Whole(*t as u64),
            Some(Value::Float(t)) if t.is_finite() && *t >= 0.0 => PopTimeout::Fractional(*t),
            Some(Value::Str(s)) => {
                let s = s.trim();
                match s.parse::<u64>() {
                    Ok(t) => PopTimeout::Whole(t),
                    Err(_) => match s.parse::<f64>() {
                        Ok(t) if t.is_finite() && t >= 0.0 => PopTimeout::Fractional(t),
                        _ => return Err(invalid_timeout(&args[1])),
                    },
                }
            }
            Some(other) => return Err(invalid_timeout(other)),
        };

        Ok(Self { key, timeout })
    }

    /// Arguments sent to the shard: the key and an explicit timeout
    pub fn forward_args(&self) -> [Value; 2] {
        [Value::from(self.key), self.timeout.into_value()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::from(*s)).collect()
    }

    #[test]
    fn test_keyed_args() {
        let args = strs(&["test_key", "arg1", "arg2"]);
        let parsed = KeyedArgs::parse("get", &args).unwrap();
        assert_eq!(parsed.key, "test_key");
        assert_eq!(parsed.args.len(), 3);
    }

    #[test]
    fn test_keyed_args_missing_or_wrong_type() {
        let err = KeyedArgs::parse("get", &[]).unwrap_err();
        assert!(matches!(err, RouterError::MissingKey { position: KeyPosition::First, .. }));

        let args = vec![Value::Int(123), Value::from("arg1")];
        let err = KeyedArgs::parse("get", &args).unwrap_err();
        assert!(matches!(err, RouterError::WrongKeyType { found: "integer", .. }));
        assert!(err.to_string().starts_with("method 'get' requires a key param as the first argument"));
    }

    #[test]
    fn test_tagged_args_string_key() {
        let args = strs(&["foo{test_key}bar", "arg0"]);
        let parsed = TaggedArgs::parse("tag_foobar", &args).unwrap();
        assert_eq!(parsed.tag_key, "foo{test_key}bar");
    }

    #[test]
    fn test_tagged_args_list_key() {
        let args = vec![Value::from(vec!["foo{test_key}bar", "test_key"]), Value::from("arg0")];
        let parsed = TaggedArgs::parse("tag_foobar", &args).unwrap();
        assert_eq!(parsed.tag_key, "foo{test_key}bar");
    }

    #[test]
    fn test_tagged_args_without_tag() {
        for args in [
            strs(&["test", "arg1"]),
            vec![Value::from(vec!["test1", "test2"])],
            vec![Value::List(vec![])],
            vec![Value::Int(1)],
        ] {
            let err = TaggedArgs::parse("tag_foobar", &args).unwrap_err();
            assert_eq!(err.to_string(), "method 'tag_foobar' requires tag key params as its arguments");
        }

        let err = TaggedArgs::parse("tag_foobar", &[]).unwrap_err();
        assert!(matches!(err, RouterError::MissingKey { .. }));
    }

    #[test]
    fn test_tagged_args_accept_open_brace_only() {
        for key in ["only{open", "a}b{c"] {
            let args = strs(&[key]);
            assert_eq!(TaggedArgs::parse("tag_get", &args).unwrap().tag_key, key);
        }

        let args = vec![Value::from(vec!["foo{bar", "x"])];
        assert_eq!(TaggedArgs::parse("tag_get", &args).unwrap().tag_key, "foo{bar");
    }

    #[test]
    fn test_field_args() {
        let args = strs(&["arg0", "test_key", "arg2"]);
        let parsed = FieldArgs::parse("hget_in", &args).unwrap();
        assert_eq!(parsed.key, "test_key");
        assert_eq!(parsed.hash, &Value::from("arg0"));

        for bad in [vec![], strs(&["foobar"])] {
            let err = FieldArgs::parse("hget_in", &bad).unwrap_err();
            assert_eq!(err.to_string(), "method 'hget_in' requires a key param as the second argument");
        }

        let args = vec![Value::from("foobar"), Value::Int(123)];
        let err = FieldArgs::parse("hget_in", &args).unwrap_err();
        assert!(matches!(err, RouterError::WrongKeyType { position: KeyPosition::Second, .. }));
    }

    #[test]
    fn test_queue_args_accept_anything() {
        assert!(QueueArgs::parse(&[]).args.is_empty());
        assert_eq!(QueueArgs::parse(&strs(&["a", "b"])).args.len(), 2);
        assert_eq!(QueueArgs::parse(&[]).key(), "queue");
    }

    #[test]
    fn test_blocking_pop_defaults_timeout() {
        let args = strs(&["test_key"]);
        let parsed = BlockingPopArgs::parse("brpop", &args).unwrap();
        assert_eq!(parsed.key, "test_key");
        assert_eq!(parsed.timeout, PopTimeout::Whole(NO_TIMEOUT));
        assert_eq!(parsed.forward_args(), [Value::from("test_key"), Value::Int(0)]);
    }

    #[test]
    fn test_blocking_pop_timeout_forms() {
        let args = vec![Value::from("k"), Value::Int(5)];
        assert_eq!(BlockingPopArgs::parse("blpop", &args).unwrap().timeout, PopTimeout::Whole(5));

        let args = strs(&["k", "7"]);
        assert_eq!(BlockingPopArgs::parse("blpop", &args).unwrap().timeout, PopTimeout::Whole(7));

        for bad in [
            Value::Int(-1),
            Value::from("soon"),
            Value::Float(-0.5),
            Value::Float(f64::NAN),
            Value::from("-1.5"),
        ] {
            let args = vec![Value::from("k"), bad];
            let err = BlockingPopArgs::parse("blpop", &args).unwrap_err();
            assert!(matches!(err, RouterError::InvalidArgument { .. }));
        }
    }

    #[test]
    fn test_blocking_pop_fractional_timeout() {
        let args = vec![Value::from("k"), Value::Float(0.5)];
        let parsed = BlockingPopArgs::parse("brpop", &args).unwrap();
        assert_eq!(parsed.timeout, PopTimeout::Fractional(0.5));
        assert_eq!(parsed.forward_args(), [Value::from("k"), Value::Float(0.5)]);

        let args = strs(&["k", "1.25"]);
        assert_eq!(
            BlockingPopArgs::parse("brpop", &args).unwrap().timeout,
            PopTimeout::Fractional(1.25)
        );
    }

    #[test]
    fn test_fan_out_args() {
        let args = strs(&["user:*"]);
        let parsed = FanOutArgs::parse("keys", Aggregation::Concat, &args).unwrap();
        assert_eq!(parsed.pattern, Some("user:*"));

        let parsed = FanOutArgs::parse("flushdb", Aggregation::Discard, &[]).unwrap();
        assert_eq!(parsed.pattern, None);
    }

    #[test]
    fn test_fan_out_args_rejected() {
        let err = FanOutArgs::parse("keys", Aggregation::Concat, &[]).unwrap_err();
        assert!(matches!(err, RouterError::MissingKey { position: KeyPosition::First, .. }));

        let args = vec![Value::Int(1)];
        let err = FanOutArgs::parse("keys", Aggregation::Concat, &args).unwrap_err();
        assert!(matches!(err, RouterError::WrongKeyType { found: "integer", .. }));

        let args = strs(&["a*", "b*"]);
        let err = FanOutArgs::parse("keys", Aggregation::Concat, &args).unwrap_err();
        assert!(matches!(err, RouterError::InvalidArgument { .. }));

        let args = strs(&["now"]);
        let err = FanOutArgs::parse("flushdb", Aggregation::Discard, &args).unwrap_err();
        assert!(matches!(err, RouterError::InvalidArgument { .. }));
    }

    #[test]
    fn test_blocking_pop_rejects_multiple_keys() {
        for args in [
            vec![Value::Int(123)],
            vec![Value::from(vec!["a", "b"])],
            strs(&["a", "b", "0"]),
        ] {
            let err = BlockingPopArgs::parse("blpop", &args).unwrap_err();
            assert!(matches!(err, RouterError::MultipleKeys { .. }), "{:?}", args);
            assert!(err.to_string().contains("multiple keys cannot be sharded"));
        }

        let err = BlockingPopArgs::parse("blpop", &[]).unwrap_err();
        assert!(matches!(err, RouterError::MissingKey { .. }));
    }
}
