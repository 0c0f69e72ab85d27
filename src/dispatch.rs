//! String-command dispatch.
//!
//! [`Db::call`] takes a command the way a client driver would send it —
//! name plus raw arguments — parses the option tokens and routes to the
//! typed method. Results come back as a [`Reply`] value; errors are the
//! same typed errors the methods raise, plus [`KvError::UnknownCommand`]
//! for names with no handler.

use std::time::Duration;

use crate::db::Db;
use crate::error::{KvError, Result};
use crate::sort::{SortOptions, Sorted};
use crate::types::{format_float, Aggregate, SetOptions, ZMember};
use crate::zset::parse_score;

/// A command-shaped result value.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Simple(String),
    Int(i64),
    Bulk(Vec<u8>),
    Array(Vec<Reply>),
}

impl Reply {
    fn ok() -> Reply {
        Reply::Simple("OK".to_string())
    }

    fn bulk(bytes: impl Into<Vec<u8>>) -> Reply {
        Reply::Bulk(bytes.into())
    }

    fn opt(value: Option<Vec<u8>>) -> Reply {
        match value {
            Some(b) => Reply::Bulk(b),
            None => Reply::Nil,
        }
    }

    fn bools(value: bool) -> Reply {
        Reply::Int(value as i64)
    }

    fn bulks(values: Vec<Vec<u8>>) -> Reply {
        Reply::Array(values.into_iter().map(Reply::Bulk).collect())
    }

    fn opts(values: Vec<Option<Vec<u8>>>) -> Reply {
        Reply::Array(values.into_iter().map(Reply::opt).collect())
    }

    fn strings(values: Vec<String>) -> Reply {
        Reply::Array(values.into_iter().map(|s| Reply::Bulk(s.into_bytes())).collect())
    }

    fn members(members: Vec<ZMember>, with_scores: bool) -> Reply {
        let mut out = Vec::new();
        for m in members {
            out.push(Reply::Bulk(m.member));
            if with_scores {
                out.push(Reply::Bulk(format_float(m.score).into_bytes()));
            }
        }
        Reply::Array(out)
    }
}

fn text(arg: &[u8]) -> Result<&str> {
    std::str::from_utf8(arg).map_err(|_| KvError::Syntax)
}

fn int(arg: &[u8]) -> Result<i64> {
    text(arg)?.parse::<i64>().map_err(|_| KvError::NotInteger)
}

fn float(arg: &[u8]) -> Result<f64> {
    parse_score(text(arg)?)
}

fn need(args: &[Vec<u8>], min: usize, cmd: &'static str) -> Result<()> {
    if args.len() < min {
        return Err(KvError::WrongArity(cmd));
    }
    Ok(())
}

fn exact(args: &[Vec<u8>], n: usize, cmd: &'static str) -> Result<()> {
    if args.len() != n {
        return Err(KvError::WrongArity(cmd));
    }
    Ok(())
}

/// MATCH/COUNT pairs trailing the scan family. An odd token count is an
/// arity error, like the original.
fn scan_opts(args: &[Vec<u8>], cmd: &'static str) -> Result<(Option<String>, usize)> {
    if args.len() % 2 != 0 {
        return Err(KvError::WrongArity(cmd));
    }
    let mut pattern = None;
    let mut count = 10usize;
    let mut i = 0;
    while i < args.len() {
        match text(&args[i])?.to_uppercase().as_str() {
            "MATCH" => pattern = Some(text(&args[i + 1])?.to_string()),
            "COUNT" => {
                count = int(&args[i + 1])?.max(1) as usize;
            }
            _ => return Err(KvError::Syntax),
        }
        i += 2;
    }
    Ok((pattern, count))
}

/// Key/value argument pairs (MSET and friends).
fn pairs<'a>(args: &'a [Vec<u8>], odd_label: &'static str) -> Result<Vec<(&'a str, &'a [u8])>> {
    if args.len() % 2 != 0 {
        return Err(KvError::WrongArityLegacy(odd_label));
    }
    let mut out = Vec::with_capacity(args.len() / 2);
    for chunk in args.chunks(2) {
        out.push((text(&chunk[0])?, chunk[1].as_slice()));
    }
    Ok(out)
}

fn keys_of<'a>(args: &'a [Vec<u8>]) -> Result<Vec<&'a str>> {
    args.iter().map(|a| text(a)).collect()
}

impl Db {
    /// Execute one command given as raw name + arguments.
    pub fn call(&mut self, args: &[Vec<u8>]) -> Result<Reply> {
        let Some((name, args)) = args.split_first() else {
            return Err(KvError::UnknownCommand(String::new()));
        };
        let cmd = String::from_utf8_lossy(name).to_uppercase();

        match cmd.as_str() {
            // Server
            "PING" => match args.first() {
                None => Ok(Reply::Simple(self.ping()?)),
                Some(msg) => Ok(Reply::bulk(msg.clone())),
            },
            "ECHO" => {
                exact(args, 1, "echo")?;
                Ok(Reply::Bulk(self.echo(&args[0])?))
            }
            "AUTH" => {
                exact(args, 1, "auth")?;
                self.auth(text(&args[0])?)?;
                Ok(Reply::ok())
            }
            "SELECT" => {
                exact(args, 1, "select")?;
                let index = int(&args[0])?;
                if index < 0 {
                    return Err(KvError::InvalidDbIndex);
                }
                self.select(index as usize)?;
                Ok(Reply::ok())
            }
            "INFO" => {
                let mut out = String::new();
                for (k, v) in self.info()? {
                    out.push_str(&format!("{}:{}\r\n", k, v));
                }
                Ok(Reply::bulk(out.into_bytes()))
            }
            "TIME" => {
                let (secs, micros) = self.time()?;
                Ok(Reply::Array(vec![
                    Reply::bulk(secs.to_string().into_bytes()),
                    Reply::bulk(micros.to_string().into_bytes()),
                ]))
            }
            "DBSIZE" => Ok(Reply::Int(self.dbsize()?)),
            "FLUSHDB" => {
                self.flushdb()?;
                Ok(Reply::ok())
            }
            "FLUSHALL" => {
                self.flushall()?;
                Ok(Reply::ok())
            }

            // Strings
            "GET" => {
                exact(args, 1, "get")?;
                Ok(Reply::opt(self.get(text(&args[0])?)?))
            }
            "SET" => cmd_set(self, args),
            "GETSET" => {
                exact(args, 2, "getset")?;
                Ok(Reply::opt(self.getset(text(&args[0])?, &args[1])?))
            }
            "SETNX" => {
                exact(args, 2, "setnx")?;
                Ok(Reply::bools(self.setnx(text(&args[0])?, &args[1])?))
            }
            "SETEX" => {
                exact(args, 3, "setex")?;
                self.setex(text(&args[0])?, int(&args[1])?, &args[2])?;
                Ok(Reply::ok())
            }
            "APPEND" => {
                exact(args, 2, "append")?;
                Ok(Reply::Int(self.append(text(&args[0])?, &args[1])?))
            }
            "STRLEN" => {
                exact(args, 1, "strlen")?;
                Ok(Reply::Int(self.strlen(text(&args[0])?)?))
            }
            "INCR" => {
                exact(args, 1, "incr")?;
                Ok(Reply::Int(self.incr(text(&args[0])?)?))
            }
            "DECR" => {
                exact(args, 1, "decr")?;
                Ok(Reply::Int(self.decr(text(&args[0])?)?))
            }
            "INCRBY" => {
                exact(args, 2, "incrby")?;
                Ok(Reply::Int(self.incrby(text(&args[0])?, int(&args[1])?)?))
            }
            "DECRBY" => {
                exact(args, 2, "decrby")?;
                Ok(Reply::Int(self.decrby(text(&args[0])?, int(&args[1])?)?))
            }
            "INCRBYFLOAT" => {
                exact(args, 2, "incrbyfloat")?;
                let value = self.incrbyfloat(text(&args[0])?, float(&args[1])?)?;
                Ok(Reply::bulk(value.into_bytes()))
            }
            "MGET" => {
                let keys = keys_of(args)?;
                Ok(Reply::opts(self.mget(&keys)?))
            }
            "MSET" => {
                need(args, 1, "mset")?;
                self.mset(&pairs(args, "MSET")?)?;
                Ok(Reply::ok())
            }
            "MSETNX" => {
                need(args, 1, "msetnx")?;
                Ok(Reply::bools(self.msetnx(&pairs(args, "MSET")?)?))
            }
            "GETRANGE" => {
                exact(args, 3, "getrange")?;
                let bytes = self.getrange(text(&args[0])?, int(&args[1])?, int(&args[2])?)?;
                Ok(Reply::Bulk(bytes))
            }
            "SETRANGE" => {
                exact(args, 3, "setrange")?;
                Ok(Reply::Int(self.setrange(
                    text(&args[0])?,
                    int(&args[1])?,
                    &args[2],
                )?))
            }
            "SETBIT" => {
                exact(args, 3, "setbit")?;
                let bit = match int(&args[2])? {
                    0 => false,
                    1 => true,
                    _ => return Err(KvError::Syntax),
                };
                Ok(Reply::Int(self.setbit(
                    text(&args[0])?,
                    int(&args[1])?.max(0) as u64,
                    bit,
                )?))
            }
            "GETBIT" => {
                exact(args, 2, "getbit")?;
                Ok(Reply::Int(
                    self.getbit(text(&args[0])?, int(&args[1])?.max(0) as u64)?,
                ))
            }
            "BITCOUNT" => {
                let (start, end) = match args.len() {
                    1 => (0, -1),
                    3 => (int(&args[1])?, int(&args[2])?),
                    _ => return Err(KvError::Syntax),
                };
                Ok(Reply::Int(self.bitcount(text(&args[0])?, start, end)?))
            }

            // Key management
            "DEL" => {
                let keys = keys_of(args)?;
                Ok(Reply::Int(self.del(&keys)?))
            }
            "EXISTS" => {
                exact(args, 1, "exists")?;
                Ok(Reply::bools(self.exists(text(&args[0])?)?))
            }
            "EXPIRE" => {
                exact(args, 2, "expire")?;
                Ok(Reply::bools(self.expire(text(&args[0])?, int(&args[1])?)?))
            }
            "PEXPIRE" => {
                exact(args, 2, "pexpire")?;
                Ok(Reply::bools(self.pexpire(text(&args[0])?, int(&args[1])?)?))
            }
            "EXPIREAT" => {
                exact(args, 2, "expireat")?;
                Ok(Reply::bools(self.expireat(text(&args[0])?, int(&args[1])?)?))
            }
            "TTL" => {
                exact(args, 1, "ttl")?;
                Ok(Reply::Int(self.ttl(text(&args[0])?)?))
            }
            "PTTL" => {
                exact(args, 1, "pttl")?;
                Ok(Reply::Int(self.pttl(text(&args[0])?)?))
            }
            "PERSIST" => {
                exact(args, 1, "persist")?;
                Ok(Reply::bools(self.persist(text(&args[0])?)?))
            }
            "RENAME" => {
                exact(args, 2, "rename")?;
                self.rename(text(&args[0])?, text(&args[1])?)?;
                Ok(Reply::ok())
            }
            "RENAMENX" => {
                exact(args, 2, "renamenx")?;
                Ok(Reply::bools(
                    self.renamenx(text(&args[0])?, text(&args[1])?)?,
                ))
            }
            "RANDOMKEY" => Ok(Reply::opt(self.randomkey()?.map(String::into_bytes))),
            "KEYS" => {
                exact(args, 1, "keys")?;
                Ok(Reply::strings(self.keys(text(&args[0])?)?))
            }
            "SCAN" => {
                need(args, 1, "scan")?;
                let (pattern, count) = scan_opts(&args[1..], "scan")?;
                let (cursor, keys) = self.scan(text(&args[0])?, pattern.as_deref(), count)?;
                Ok(Reply::Array(vec![
                    Reply::bulk(cursor.into_bytes()),
                    Reply::strings(keys),
                ]))
            }
            "TYPE" => {
                exact(args, 1, "type")?;
                let name = self
                    .key_type(text(&args[0])?)?
                    .map_or("none", |t| t.as_str());
                Ok(Reply::Simple(name.to_string()))
            }
            "MOVE" => {
                exact(args, 2, "move")?;
                let dest = int(&args[1])?;
                if dest < 0 {
                    return Err(KvError::InvalidDbIndex);
                }
                Ok(Reply::bools(self.move_key(text(&args[0])?, dest as usize)?))
            }
            "DUMP" => {
                exact(args, 1, "dump")?;
                Ok(Reply::opt(self.dump(text(&args[0])?)?))
            }
            "RESTORE" => {
                exact(args, 3, "restore")?;
                self.restore(text(&args[0])?, int(&args[1])?, &args[2])?;
                Ok(Reply::ok())
            }

            // Lists
            "LPUSH" => cmd_push(self, args, "lpush"),
            "RPUSH" => cmd_push(self, args, "rpush"),
            "LPUSHX" => cmd_push(self, args, "lpushx"),
            "RPUSHX" => cmd_push(self, args, "rpushx"),
            "LPOP" => {
                exact(args, 1, "lpop")?;
                Ok(Reply::opt(self.lpop(text(&args[0])?)?))
            }
            "RPOP" => {
                exact(args, 1, "rpop")?;
                Ok(Reply::opt(self.rpop(text(&args[0])?)?))
            }
            "LRANGE" => {
                exact(args, 3, "lrange")?;
                Ok(Reply::bulks(self.lrange(
                    text(&args[0])?,
                    int(&args[1])?,
                    int(&args[2])?,
                )?))
            }
            "LINDEX" => {
                exact(args, 2, "lindex")?;
                Ok(Reply::opt(self.lindex(text(&args[0])?, int(&args[1])?)?))
            }
            "LINSERT" => {
                exact(args, 4, "linsert")?;
                let before = match text(&args[1])?.to_uppercase().as_str() {
                    "BEFORE" => true,
                    "AFTER" => false,
                    _ => return Err(KvError::Syntax),
                };
                Ok(Reply::Int(self.linsert(
                    text(&args[0])?,
                    before,
                    &args[2],
                    &args[3],
                )?))
            }
            "LSET" => {
                exact(args, 3, "lset")?;
                self.lset(text(&args[0])?, int(&args[1])?, &args[2])?;
                Ok(Reply::ok())
            }
            "LREM" => {
                exact(args, 3, "lrem")?;
                Ok(Reply::Int(self.lrem(
                    text(&args[0])?,
                    int(&args[1])?,
                    &args[2],
                )?))
            }
            "LTRIM" => {
                exact(args, 3, "ltrim")?;
                self.ltrim(text(&args[0])?, int(&args[1])?, int(&args[2])?)?;
                Ok(Reply::ok())
            }
            "LLEN" => {
                exact(args, 1, "llen")?;
                Ok(Reply::Int(self.llen(text(&args[0])?)?))
            }
            "RPOPLPUSH" => {
                exact(args, 2, "rpoplpush")?;
                Ok(Reply::opt(
                    self.rpoplpush(text(&args[0])?, text(&args[1])?)?,
                ))
            }
            "BLPOP" => cmd_blocking_pop(self, args, "blpop"),
            "BRPOP" => cmd_blocking_pop(self, args, "brpop"),
            "BRPOPLPUSH" => {
                exact(args, 3, "brpoplpush")?;
                let timeout = text(&args[2])?
                    .parse::<f64>()
                    .map_err(|_| KvError::NotFloat)?;
                Ok(Reply::opt(self.brpoplpush(
                    text(&args[0])?,
                    text(&args[1])?,
                    timeout,
                )?))
            }

            // Sets
            "SADD" => {
                need(args, 2, "sadd")?;
                let members: Vec<&[u8]> = args[1..].iter().map(Vec::as_slice).collect();
                Ok(Reply::Int(self.sadd(text(&args[0])?, &members)?))
            }
            "SREM" => {
                need(args, 2, "srem")?;
                let members: Vec<&[u8]> = args[1..].iter().map(Vec::as_slice).collect();
                Ok(Reply::Int(self.srem(text(&args[0])?, &members)?))
            }
            "SMEMBERS" => {
                exact(args, 1, "smembers")?;
                Ok(Reply::bulks(self.smembers(text(&args[0])?)?))
            }
            "SISMEMBER" => {
                exact(args, 2, "sismember")?;
                Ok(Reply::bools(self.sismember(text(&args[0])?, &args[1])?))
            }
            "SCARD" => {
                exact(args, 1, "scard")?;
                Ok(Reply::Int(self.scard(text(&args[0])?)?))
            }
            "SPOP" => {
                exact(args, 1, "spop")?;
                Ok(Reply::opt(self.spop(text(&args[0])?)?))
            }
            "SRANDMEMBER" => {
                need(args, 1, "srandmember")?;
                let key = text(&args[0])?;
                match args.get(1) {
                    None => {
                        let picked = self.srandmember(key, None)?;
                        Ok(Reply::opt(picked.into_iter().next()))
                    }
                    Some(count) => Ok(Reply::bulks(self.srandmember(key, Some(int(count)?))?)),
                }
            }
            "SMOVE" => {
                exact(args, 3, "smove")?;
                Ok(Reply::bools(self.smove(
                    text(&args[0])?,
                    text(&args[1])?,
                    &args[2],
                )?))
            }
            "SINTER" => Ok(Reply::bulks(self.sinter(&keys_of(args)?)?)),
            "SUNION" => Ok(Reply::bulks(self.sunion(&keys_of(args)?)?)),
            "SDIFF" => Ok(Reply::bulks(self.sdiff(&keys_of(args)?)?)),
            "SINTERSTORE" => {
                need(args, 2, "sinterstore")?;
                let keys = keys_of(&args[1..])?;
                Ok(Reply::Int(self.sinterstore(text(&args[0])?, &keys)?))
            }
            "SUNIONSTORE" => {
                need(args, 2, "sunionstore")?;
                let keys = keys_of(&args[1..])?;
                Ok(Reply::Int(self.sunionstore(text(&args[0])?, &keys)?))
            }
            "SDIFFSTORE" => {
                need(args, 2, "sdiffstore")?;
                let keys = keys_of(&args[1..])?;
                Ok(Reply::Int(self.sdiffstore(text(&args[0])?, &keys)?))
            }
            "SSCAN" => {
                need(args, 2, "sscan")?;
                let (pattern, count) = scan_opts(&args[2..], "sscan")?;
                let (cursor, members) =
                    self.sscan(text(&args[0])?, text(&args[1])?, pattern.as_deref(), count)?;
                Ok(Reply::Array(vec![
                    Reply::bulk(cursor.into_bytes()),
                    Reply::bulks(members),
                ]))
            }

            // Hashes
            "HSET" => {
                exact(args, 3, "hset")?;
                Ok(Reply::bools(self.hset(
                    text(&args[0])?,
                    text(&args[1])?,
                    &args[2],
                )?))
            }
            "HSETNX" => {
                exact(args, 3, "hsetnx")?;
                Ok(Reply::bools(self.hsetnx(
                    text(&args[0])?,
                    text(&args[1])?,
                    &args[2],
                )?))
            }
            "HGET" => {
                exact(args, 2, "hget")?;
                Ok(Reply::opt(self.hget(text(&args[0])?, text(&args[1])?)?))
            }
            "HDEL" => {
                need(args, 2, "hdel")?;
                let fields = keys_of(&args[1..])?;
                Ok(Reply::Int(self.hdel(text(&args[0])?, &fields)?))
            }
            "HMSET" => {
                need(args, 2, "hmset")?;
                self.hmset(text(&args[0])?, &pairs(&args[1..], "HMSET")?)?;
                Ok(Reply::ok())
            }
            "HMGET" => {
                need(args, 2, "hmget")?;
                let fields = keys_of(&args[1..])?;
                Ok(Reply::opts(self.hmget(text(&args[0])?, &fields)?))
            }
            "HGETALL" => {
                exact(args, 1, "hgetall")?;
                let mut out = Vec::new();
                for (field, value) in self.hgetall(text(&args[0])?)? {
                    out.push(Reply::bulk(field.into_bytes()));
                    out.push(Reply::Bulk(value));
                }
                Ok(Reply::Array(out))
            }
            "HKEYS" => {
                exact(args, 1, "hkeys")?;
                Ok(Reply::strings(self.hkeys(text(&args[0])?)?))
            }
            "HVALS" => {
                exact(args, 1, "hvals")?;
                Ok(Reply::bulks(self.hvals(text(&args[0])?)?))
            }
            "HLEN" => {
                exact(args, 1, "hlen")?;
                Ok(Reply::Int(self.hlen(text(&args[0])?)?))
            }
            "HEXISTS" => {
                exact(args, 2, "hexists")?;
                Ok(Reply::bools(self.hexists(text(&args[0])?, text(&args[1])?)?))
            }
            "HINCRBY" => {
                exact(args, 3, "hincrby")?;
                Ok(Reply::Int(self.hincrby(
                    text(&args[0])?,
                    text(&args[1])?,
                    int(&args[2])?,
                )?))
            }
            "HINCRBYFLOAT" => {
                exact(args, 3, "hincrbyfloat")?;
                let value =
                    self.hincrbyfloat(text(&args[0])?, text(&args[1])?, float(&args[2])?)?;
                Ok(Reply::bulk(value.into_bytes()))
            }
            "HSCAN" => {
                need(args, 2, "hscan")?;
                let (pattern, count) = scan_opts(&args[2..], "hscan")?;
                let (cursor, entries) =
                    self.hscan(text(&args[0])?, text(&args[1])?, pattern.as_deref(), count)?;
                let mut page = Vec::new();
                for (field, value) in entries {
                    page.push(Reply::bulk(field.into_bytes()));
                    page.push(Reply::Bulk(value));
                }
                Ok(Reply::Array(vec![
                    Reply::bulk(cursor.into_bytes()),
                    Reply::Array(page),
                ]))
            }

            // Sorted sets
            "ZADD" => cmd_zadd(self, args),
            "ZREM" => {
                need(args, 2, "zrem")?;
                let members: Vec<&[u8]> = args[1..].iter().map(Vec::as_slice).collect();
                Ok(Reply::Int(self.zrem(text(&args[0])?, &members)?))
            }
            "ZCARD" => {
                exact(args, 1, "zcard")?;
                Ok(Reply::Int(self.zcard(text(&args[0])?)?))
            }
            "ZCOUNT" => {
                exact(args, 3, "zcount")?;
                Ok(Reply::Int(self.zcount(
                    text(&args[0])?,
                    text(&args[1])?,
                    text(&args[2])?,
                )?))
            }
            "ZSCORE" => {
                exact(args, 2, "zscore")?;
                Ok(match self.zscore(text(&args[0])?, &args[1])? {
                    Some(score) => Reply::bulk(format_float(score).into_bytes()),
                    None => Reply::Nil,
                })
            }
            "ZINCRBY" => {
                exact(args, 3, "zincrby")?;
                let score = self.zincrby(text(&args[0])?, float(&args[1])?, &args[2])?;
                Ok(Reply::bulk(format_float(score).into_bytes()))
            }
            "ZRANK" => {
                exact(args, 2, "zrank")?;
                Ok(match self.zrank(text(&args[0])?, &args[1])? {
                    Some(rank) => Reply::Int(rank),
                    None => Reply::Nil,
                })
            }
            "ZREVRANK" => {
                exact(args, 2, "zrevrank")?;
                Ok(match self.zrevrank(text(&args[0])?, &args[1])? {
                    Some(rank) => Reply::Int(rank),
                    None => Reply::Nil,
                })
            }
            "ZRANGE" => cmd_zrange(self, args, false),
            "ZREVRANGE" => cmd_zrange(self, args, true),
            "ZRANGEBYSCORE" => cmd_zrangebyscore(self, args, false),
            "ZREVRANGEBYSCORE" => cmd_zrangebyscore(self, args, true),
            "ZREMRANGEBYSCORE" => {
                exact(args, 3, "zremrangebyscore")?;
                Ok(Reply::Int(self.zremrangebyscore(
                    text(&args[0])?,
                    text(&args[1])?,
                    text(&args[2])?,
                )?))
            }
            "ZREMRANGEBYRANK" => {
                exact(args, 3, "zremrangebyrank")?;
                Ok(Reply::Int(self.zremrangebyrank(
                    text(&args[0])?,
                    int(&args[1])?,
                    int(&args[2])?,
                )?))
            }
            "ZINTERSTORE" => cmd_weighted_store(self, args, true),
            "ZUNIONSTORE" => cmd_weighted_store(self, args, false),
            "ZSCAN" => {
                need(args, 2, "zscan")?;
                let (pattern, count) = scan_opts(&args[2..], "zscan")?;
                let (cursor, members) =
                    self.zscan(text(&args[0])?, text(&args[1])?, pattern.as_deref(), count)?;
                Ok(Reply::Array(vec![
                    Reply::bulk(cursor.into_bytes()),
                    Reply::members(members, true),
                ]))
            }

            "SORT" => cmd_sort(self, args),

            _ => Err(KvError::UnknownCommand(cmd)),
        }
    }
}

fn cmd_set(db: &Db, args: &[Vec<u8>]) -> Result<Reply> {
    need(args, 2, "set")?;
    let key = text(&args[0])?;
    let value = &args[1];

    let mut opts = SetOptions::new();
    let mut i = 2;
    while i < args.len() {
        match text(&args[i])?.to_uppercase().as_str() {
            "NX" => {
                opts.nx = true;
                i += 1;
            }
            "XX" => {
                opts.xx = true;
                i += 1;
            }
            "EX" => {
                let seconds = int(args.get(i + 1).ok_or(KvError::Syntax)?)?;
                opts.ttl = Some(Duration::from_secs(seconds.max(0) as u64));
                i += 2;
            }
            "PX" => {
                let ms = int(args.get(i + 1).ok_or(KvError::Syntax)?)?;
                opts.ttl = Some(Duration::from_millis(ms.max(0) as u64));
                i += 2;
            }
            _ => return Err(KvError::Syntax),
        }
    }

    if db.set_opts(key, value, opts)? {
        Ok(Reply::ok())
    } else {
        Ok(Reply::Nil)
    }
}

fn cmd_push(db: &Db, args: &[Vec<u8>], cmd: &'static str) -> Result<Reply> {
    need(args, 2, cmd)?;
    let key = text(&args[0])?;
    let values: Vec<&[u8]> = args[1..].iter().map(Vec::as_slice).collect();
    let len = match cmd {
        "lpush" => db.lpush(key, &values)?,
        "rpush" => db.rpush(key, &values)?,
        "lpushx" => db.lpushx(key, &values)?,
        _ => db.rpushx(key, &values)?,
    };
    Ok(Reply::Int(len))
}

fn cmd_blocking_pop(db: &Db, args: &[Vec<u8>], cmd: &'static str) -> Result<Reply> {
    need(args, 2, cmd)?;
    let Some((timeout_arg, key_args)) = args.split_last() else {
        return Err(KvError::WrongArity(cmd));
    };
    let timeout = text(timeout_arg)?
        .parse::<f64>()
        .map_err(|_| KvError::NotFloat)?;
    let keys = keys_of(key_args)?;
    let popped = if cmd == "blpop" {
        db.blpop(&keys, timeout)?
    } else {
        db.brpop(&keys, timeout)?
    };
    Ok(match popped {
        Some((key, value)) => {
            Reply::Array(vec![Reply::bulk(key.into_bytes()), Reply::Bulk(value)])
        }
        None => Reply::Nil,
    })
}

fn cmd_zadd(db: &Db, args: &[Vec<u8>]) -> Result<Reply> {
    need(args, 3, "zadd")?;
    let key = text(&args[0])?;
    if (args.len() - 1) % 2 != 0 {
        return Err(KvError::Syntax);
    }
    let mut members = Vec::with_capacity((args.len() - 1) / 2);
    for chunk in args[1..].chunks(2) {
        members.push(ZMember::new(float(&chunk[0])?, chunk[1].clone()));
    }
    Ok(Reply::Int(db.zadd(key, &members)?))
}

fn cmd_zrange(db: &Db, args: &[Vec<u8>], rev: bool) -> Result<Reply> {
    let cmd: &'static str = if rev { "zrevrange" } else { "zrange" };
    need(args, 3, cmd)?;
    let key = text(&args[0])?;
    let start = int(&args[1])?;
    let stop = int(&args[2])?;
    let with_scores = match args.get(3) {
        None => false,
        Some(tok) => {
            if text(tok)?.to_uppercase() != "WITHSCORES" {
                return Err(KvError::Syntax);
            }
            true
        }
    };
    let members = if rev {
        db.zrevrange(key, start, stop)?
    } else {
        db.zrange(key, start, stop)?
    };
    Ok(Reply::members(members, with_scores))
}

fn cmd_zrangebyscore(db: &Db, args: &[Vec<u8>], rev: bool) -> Result<Reply> {
    let cmd: &'static str = if rev {
        "zrevrangebyscore"
    } else {
        "zrangebyscore"
    };
    need(args, 3, cmd)?;
    let key = text(&args[0])?;
    let first = text(&args[1])?;
    let second = text(&args[2])?;

    let mut with_scores = false;
    let mut limit = None;
    let mut i = 3;
    while i < args.len() {
        match text(&args[i])?.to_uppercase().as_str() {
            "WITHSCORES" => {
                with_scores = true;
                i += 1;
            }
            "LIMIT" => {
                if i + 2 >= args.len() {
                    return Err(KvError::Syntax);
                }
                limit = Some((int(&args[i + 1])?, int(&args[i + 2])?));
                i += 3;
            }
            _ => return Err(KvError::Syntax),
        }
    }

    let members = if rev {
        db.zrevrangebyscore(key, first, second, limit)?
    } else {
        db.zrangebyscore(key, first, second, limit)?
    };
    Ok(Reply::members(members, with_scores))
}

fn cmd_weighted_store(db: &Db, args: &[Vec<u8>], intersect: bool) -> Result<Reply> {
    let cmd: &'static str = if intersect { "zinterstore" } else { "zunionstore" };
    need(args, 2, cmd)?;
    let destination = text(&args[0])?;
    let numkeys = int(&args[1])?;
    if numkeys < 0 || args.len() < 2 + numkeys as usize {
        return Err(KvError::Syntax);
    }
    let numkeys = numkeys as usize;
    let keys = keys_of(&args[2..2 + numkeys])?;

    let mut weights: Option<Vec<f64>> = None;
    let mut aggregate: Option<Aggregate> = None;
    let mut i = 2 + numkeys;
    while i < args.len() {
        match text(&args[i])?.to_uppercase().as_str() {
            "WEIGHTS" => {
                let mut values = Vec::new();
                i += 1;
                while i < args.len() {
                    let token = text(&args[i])?;
                    if token.to_uppercase() == "AGGREGATE" {
                        break;
                    }
                    values.push(token.parse::<f64>().map_err(|_| KvError::Syntax)?);
                    i += 1;
                }
                weights = Some(values);
            }
            "AGGREGATE" => {
                if aggregate.is_some() {
                    return Err(KvError::Syntax);
                }
                let token = text(args.get(i + 1).ok_or(KvError::Syntax)?)?;
                aggregate = Some(Aggregate::from_str(token).ok_or(KvError::Syntax)?);
                i += 2;
            }
            _ => return Err(KvError::Syntax),
        }
    }

    let aggregate = aggregate.unwrap_or_default();
    let len = if intersect {
        db.zinterstore(destination, &keys, weights.as_deref(), aggregate)?
    } else {
        db.zunionstore(destination, &keys, weights.as_deref(), aggregate)?
    };
    Ok(Reply::Int(len))
}

fn cmd_sort(db: &Db, args: &[Vec<u8>]) -> Result<Reply> {
    need(args, 1, "sort")?;
    let key = text(&args[0])?;

    let mut options = SortOptions::default();
    let mut i = 1;
    while i < args.len() {
        match text(&args[i])?.to_uppercase().as_str() {
            "BY" => {
                options.by = Some(text(args.get(i + 1).ok_or(KvError::Syntax)?)?.to_string());
                i += 2;
            }
            "LIMIT" => {
                if i + 2 >= args.len() {
                    return Err(KvError::Syntax);
                }
                options.limit = Some((int(&args[i + 1])?, int(&args[i + 2])?));
                i += 3;
            }
            "GET" => {
                options
                    .get
                    .push(text(args.get(i + 1).ok_or(KvError::Syntax)?)?.to_string());
                i += 2;
            }
            "ASC" | "ALPHA" => {
                options.desc = false;
                i += 1;
            }
            "DESC" => {
                options.desc = true;
                i += 1;
            }
            "STORE" => {
                options.store =
                    Some(text(args.get(i + 1).ok_or(KvError::Syntax)?)?.to_string());
                i += 2;
            }
            _ => return Err(KvError::Syntax),
        }
    }

    match db.sort(key, &options)? {
        Sorted::Stored(len) => Ok(Reply::Int(len)),
        Sorted::Values(rows) => Ok(Reply::Array(rows.into_iter().map(Reply::opt).collect())),
    }
}
