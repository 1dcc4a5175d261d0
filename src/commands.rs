//! The typed command surface.
//!
//! Every fixed-shape command is one row in the `commands!` table below: wire
//! keyword, argument slots and return type. The macro expands each row into
//! a method that marshals its arguments, dispatches through the client and
//! converts the reply. Commands with no fixed arity or with conditional
//! suffix tokens (SORT, the WITHSCORES/LIMIT range queries, the blocking
//! pops, SLAVEOF) get hand-written entry points after the table.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::reply::Outcome;
use crate::request::{Arg, Request, ToArgs};

macro_rules! commands {
    ($(
        $(#[$attr:meta])*
        $name:ident ( $($arg:ident),* ) -> $ret:ty => $keyword:literal;
    )*) => {
        impl Client {
            $(
                $(#[$attr])*
                pub async fn $name(&mut self $(, $arg: impl ToArgs)*) -> Result<Outcome<$ret>> {
                    #[allow(unused_mut)]
                    let mut request = Request::new($keyword);
                    $( request.append(&$arg); )*
                    self.dispatch_typed(request).await
                }
            )*
        }
    };
}

commands! {
    // -- Connection and server -----------------------------------------

    ping() -> String => "PING";
    echo(message) -> Bytes => "ECHO";
    auth(password) -> () => "AUTH";
    /// Number of keys in the selected database.
    dbsize() -> i64 => "DBSIZE";
    flushdb() -> () => "FLUSHDB";
    flushall() -> () => "FLUSHALL";
    save() -> () => "SAVE";
    bgsave() -> String => "BGSAVE";
    bgrewriteaof() -> String => "BGREWRITEAOF";
    /// Unix time of the last successful save to disk.
    lastsave() -> i64 => "LASTSAVE";
    info() -> Bytes => "INFO";

    // -- Strings and keys ----------------------------------------------

    /// Get the value of `key`; `None` if the key does not exist.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/get/>
    get(key) -> Option<Bytes> => "GET";
    set(key, value) -> () => "SET";
    /// Set `key` and return the value it held before.
    getset(key, value) -> Option<Bytes> => "GETSET";
    /// Set `key` only if it does not exist yet; true when the set happened.
    setnx(key, value) -> bool => "SETNX";
    /// Values of all given keys, with `None` holes for missing ones.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/mget/>
    mget(keys) -> Vec<Option<Bytes>> => "MGET";
    incr(key) -> i64 => "INCR";
    incrby(key, increment) -> i64 => "INCRBY";
    decr(key) -> i64 => "DECR";
    decrby(key, decrement) -> i64 => "DECRBY";
    append(key, value) -> i64 => "APPEND";
    strlen(key) -> i64 => "STRLEN";
    exists(key) -> bool => "EXISTS";
    /// Remove the given keys; returns how many actually existed.
    del(keys) -> i64 => "DEL";
    /// Type of the value at `key` as reported by the server ("string",
    /// "list", "set", ...) or "none".
    key_type(key) -> String => "TYPE";
    keys(pattern) -> Vec<String> => "KEYS";
    randomkey() -> Option<String> => "RANDOMKEY";
    rename(key, new_key) -> () => "RENAME";
    renamenx(key, new_key) -> bool => "RENAMENX";
    expire(key, seconds) -> bool => "EXPIRE";
    expireat(key, timestamp) -> bool => "EXPIREAT";
    persist(key) -> bool => "PERSIST";
    /// Seconds to live, -1 when no expiry is set.
    ttl(key) -> i64 => "TTL";
    /// Move `key` to another database.
    move_key(key, db) -> bool => "MOVE";

    // -- Lists -----------------------------------------------------------

    rpush(key, element) -> i64 => "RPUSH";
    lpush(key, element) -> i64 => "LPUSH";
    llen(key) -> i64 => "LLEN";
    /// Elements between `start` and `stop`, inclusive, negative indexes
    /// counting from the tail.
    lrange(key, start, stop) -> Vec<Bytes> => "LRANGE";
    ltrim(key, start, stop) -> () => "LTRIM";
    lindex(key, index) -> Option<Bytes> => "LINDEX";
    lset(key, index, element) -> () => "LSET";
    lrem(key, count, element) -> i64 => "LREM";
    lpop(key) -> Option<Bytes> => "LPOP";
    rpop(key) -> Option<Bytes> => "RPOP";
    /// Atomically pop the tail of `source` and push it on the head of
    /// `destination`.
    rpoplpush(source, destination) -> Option<Bytes> => "RPOPLPUSH";

    // -- Sets ------------------------------------------------------------

    sadd(key, member) -> bool => "SADD";
    srem(key, member) -> bool => "SREM";
    spop(key) -> Option<Bytes> => "SPOP";
    smove(source, destination, member) -> bool => "SMOVE";
    scard(key) -> i64 => "SCARD";
    sismember(key, member) -> bool => "SISMEMBER";
    smembers(key) -> HashSet<Bytes> => "SMEMBERS";
    sinter(keys) -> HashSet<Bytes> => "SINTER";
    sinterstore(destination, keys) -> i64 => "SINTERSTORE";
    sunion(keys) -> HashSet<Bytes> => "SUNION";
    sunionstore(destination, keys) -> i64 => "SUNIONSTORE";
    sdiff(keys) -> HashSet<Bytes> => "SDIFF";
    sdiffstore(destination, keys) -> i64 => "SDIFFSTORE";
    srandmember(key) -> Option<Bytes> => "SRANDMEMBER";

    // -- Sorted sets -----------------------------------------------------

    /// Add `member` with `score`; true when it was newly added rather than
    /// re-scored.
    zadd(key, score, member) -> bool => "ZADD";
    zrem(key, member) -> bool => "ZREM";
    zincrby(key, increment, member) -> f64 => "ZINCRBY";
    zrank(key, member) -> Option<i64> => "ZRANK";
    zrevrank(key, member) -> Option<i64> => "ZREVRANK";
    zcard(key) -> i64 => "ZCARD";
    zscore(key, member) -> Option<f64> => "ZSCORE";
    zcount(key, min, max) -> i64 => "ZCOUNT";
    zremrangebyscore(key, min, max) -> i64 => "ZREMRANGEBYSCORE";
    zrange(key, start, stop) -> Vec<Bytes> => "ZRANGE";
    zrevrange(key, start, stop) -> Vec<Bytes> => "ZREVRANGE";

    // -- Hashes ----------------------------------------------------------

    hset(key, field, value) -> bool => "HSET";
    hget(key, field) -> Option<Bytes> => "HGET";
    hdel(key, field) -> bool => "HDEL";
    hexists(key, field) -> bool => "HEXISTS";
    hlen(key) -> i64 => "HLEN";
    hkeys(key) -> Vec<String> => "HKEYS";
    hvals(key) -> Vec<Bytes> => "HVALS";
    /// All fields and values of the hash, as a map.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/hgetall/>
    hgetall(key) -> HashMap<String, Bytes> => "HGETALL";
    hincrby(key, field, increment) -> i64 => "HINCRBY";
    hmget(key, fields) -> Vec<Option<Bytes>> => "HMGET";
}

/// Sort ordering for [`SortOptions`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Order {
    Ascending,
    Descending,
}

/// Modifiers for [`Client::sort`]. All optional; the default sorts the
/// elements themselves, numerically, ascending.
#[derive(Clone, Debug, Default)]
pub struct SortOptions {
    /// Sort by the values of these external keys instead of the elements.
    pub by: Option<String>,
    /// Offset and count over the sorted result.
    pub limit: Option<(i64, i64)>,
    /// Return the values of these patterns instead of the elements.
    pub get: Vec<String>,
    pub order: Option<Order>,
    /// Compare lexicographically instead of numerically.
    pub alpha: bool,
    /// Store the result at this key and return its length instead.
    pub store: Option<String>,
}

impl Client {
    /// Set multiple keys at once; `pairs` flattens to alternating key and
    /// value arguments.
    pub async fn mset(&mut self, pairs: impl ToArgs) -> Result<Outcome<()>> {
        let request = mapping_request("MSET", &pairs)?;
        self.dispatch_typed(request).await
    }

    /// Like [`Client::mset`], but only when none of the keys exist yet.
    pub async fn msetnx(&mut self, pairs: impl ToArgs) -> Result<Outcome<bool>> {
        let request = mapping_request("MSETNX", &pairs)?;
        self.dispatch_typed(request).await
    }

    /// Set multiple hash fields at once.
    pub async fn hmset(&mut self, key: impl ToArgs, pairs: impl ToArgs) -> Result<Outcome<()>> {
        let mut request = Request::new("HMSET");
        request.append(&key);
        let key_args = request.arg_count();
        request.append(&pairs);
        if request.arg_count() == key_args || (request.arg_count() - key_args) % 2 != 0 {
            return Err(Error::InvalidArgument(
                "hmset requires field/value pairs".to_string(),
            ));
        }
        self.dispatch_typed(request).await
    }

    /// Sort a list, set or sorted set. SORT has no fixed arity, so it is
    /// built by hand rather than generated; the reply is the sorted
    /// elements, or the stored length when [`SortOptions::store`] is set.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/sort/>
    pub async fn sort(
        &mut self,
        key: impl ToArgs,
        options: SortOptions,
    ) -> Result<Outcome<Frame>> {
        let request = sort_request(&key, &options);
        self.dispatch_typed(request).await
    }

    /// Members in the given score range.
    pub async fn zrangebyscore(
        &mut self,
        key: impl ToArgs,
        min: f64,
        max: f64,
        limit: Option<(i64, i64)>,
    ) -> Result<Outcome<Vec<Bytes>>> {
        let request = score_range_request("ZRANGEBYSCORE", &key, min, max, false, limit);
        self.dispatch_typed(request).await
    }

    /// Members in the given score range, with their scores.
    pub async fn zrangebyscore_withscores(
        &mut self,
        key: impl ToArgs,
        min: f64,
        max: f64,
        limit: Option<(i64, i64)>,
    ) -> Result<Outcome<Vec<(Bytes, f64)>>> {
        let request = score_range_request("ZRANGEBYSCORE", &key, min, max, true, limit);
        self.dispatch_typed(request).await
    }

    pub async fn zrange_withscores(
        &mut self,
        key: impl ToArgs,
        start: i64,
        stop: i64,
    ) -> Result<Outcome<Vec<(Bytes, f64)>>> {
        let request = index_range_request("ZRANGE", &key, start, stop);
        self.dispatch_typed(request).await
    }

    pub async fn zrevrange_withscores(
        &mut self,
        key: impl ToArgs,
        start: i64,
        stop: i64,
    ) -> Result<Outcome<Vec<(Bytes, f64)>>> {
        let request = index_range_request("ZREVRANGE", &key, start, stop);
        self.dispatch_typed(request).await
    }

    /// Blocking head pop over one or more lists. `None` means the timeout
    /// elapsed with every list still empty; a zero timeout blocks forever.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/blpop/>
    pub async fn blpop(
        &mut self,
        keys: impl ToArgs,
        timeout: u64,
    ) -> Result<Outcome<Option<(String, Bytes)>>> {
        let request = blocking_pop_request("BLPOP", &keys, timeout)?;
        self.dispatch_typed(request).await
    }

    /// Blocking tail pop; see [`Client::blpop`].
    pub async fn brpop(
        &mut self,
        keys: impl ToArgs,
        timeout: u64,
    ) -> Result<Outcome<Option<(String, Bytes)>>> {
        let request = blocking_pop_request("BRPOP", &keys, timeout)?;
        self.dispatch_typed(request).await
    }

    /// Make this server a replica of `master`, or promote it back to master
    /// when called with `None` (spelled `SLAVEOF NO ONE` on the wire).
    pub async fn slaveof(&mut self, master: Option<(&str, u16)>) -> Result<Outcome<()>> {
        let mut request = Request::new("SLAVEOF");
        match master {
            Some((host, port)) => {
                request.append(&host);
                request.append(&port);
            }
            None => {
                request.push(Arg::Simple("NO".to_string()));
                request.push(Arg::Simple("ONE".to_string()));
            }
        }
        self.dispatch_typed(request).await
    }

    pub async fn config_get(
        &mut self,
        parameter: impl ToArgs,
    ) -> Result<Outcome<HashMap<String, Bytes>>> {
        let mut request = Request::new("CONFIG");
        request.push(Arg::Simple("GET".to_string()));
        request.append(&parameter);
        self.dispatch_typed(request).await
    }

    pub async fn config_set(
        &mut self,
        parameter: impl ToArgs,
        value: impl ToArgs,
    ) -> Result<Outcome<()>> {
        let mut request = Request::new("CONFIG");
        request.push(Arg::Simple("SET".to_string()));
        request.append(&parameter);
        request.append(&value);
        self.dispatch_typed(request).await
    }
}

fn mapping_request<A: ToArgs + ?Sized>(keyword: &'static str, pairs: &A) -> Result<Request> {
    let mut request = Request::new(keyword);
    request.append(pairs);
    if request.arg_count() == 0 {
        return Err(Error::InvalidArgument(format!(
            "{} requires at least one key/value pair",
            keyword.to_lowercase()
        )));
    }
    if request.arg_count() % 2 != 0 {
        return Err(Error::InvalidArgument(format!(
            "{} requires key/value pairs",
            keyword.to_lowercase()
        )));
    }
    Ok(request)
}

fn sort_request<K: ToArgs + ?Sized>(key: &K, options: &SortOptions) -> Request {
    let mut request = Request::new("SORT");
    request.append(key);

    if let Some(by) = &options.by {
        request.push(Arg::Simple("BY".to_string()));
        request.append(by);
    }
    if let Some((offset, count)) = options.limit {
        request.push(Arg::Simple("LIMIT".to_string()));
        request.append(&offset);
        request.append(&count);
    }
    for pattern in &options.get {
        request.push(Arg::Simple("GET".to_string()));
        request.append(pattern);
    }
    match options.order {
        Some(Order::Ascending) => {
            request.push(Arg::Simple("ASC".to_string()));
        }
        Some(Order::Descending) => {
            request.push(Arg::Simple("DESC".to_string()));
        }
        None => {}
    }
    if options.alpha {
        request.push(Arg::Simple("ALPHA".to_string()));
    }
    if let Some(store) = &options.store {
        request.push(Arg::Simple("STORE".to_string()));
        request.append(store);
    }

    request
}

fn score_range_request<K: ToArgs + ?Sized>(
    keyword: &'static str,
    key: &K,
    min: f64,
    max: f64,
    withscores: bool,
    limit: Option<(i64, i64)>,
) -> Request {
    let mut request = Request::new(keyword);
    request.append(key);
    request.append(&min);
    request.append(&max);
    if withscores {
        request.push(Arg::Simple("WITHSCORES".to_string()));
    }
    // The LIMIT clause only lands on the wire when both an offset and a
    // count were supplied.
    if let Some((offset, count)) = limit {
        request.push(Arg::Simple("LIMIT".to_string()));
        request.append(&offset);
        request.append(&count);
    }
    request
}

fn index_range_request<K: ToArgs + ?Sized>(
    keyword: &'static str,
    key: &K,
    start: i64,
    stop: i64,
) -> Request {
    let mut request = Request::new(keyword);
    request.append(key);
    request.append(&start);
    request.append(&stop);
    request.push(Arg::Simple("WITHSCORES".to_string()));
    request
}

fn blocking_pop_request<A: ToArgs + ?Sized>(
    keyword: &'static str,
    keys: &A,
    timeout: u64,
) -> Result<Request> {
    let mut request = Request::new(keyword);
    request.append(keys);
    if request.arg_count() == 0 {
        return Err(Error::InvalidArgument(format!(
            "{} requires at least one key",
            keyword.to_lowercase()
        )));
    }
    request.append(&timeout);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_with_no_options_is_bare() {
        let request = sort_request(&"mylist", &SortOptions::default());
        assert_eq!(&request.encode()[..], b"*2\r\n$4\r\nSORT\r\n$6\r\nmylist\r\n");
    }

    #[test]
    fn sort_appends_modifiers_in_server_order() {
        let options = SortOptions {
            by: Some("weight_*".to_string()),
            limit: Some((0, 10)),
            get: vec!["object_*".to_string(), "#".to_string()],
            order: Some(Order::Descending),
            alpha: true,
            store: Some("dest".to_string()),
        };

        let request = sort_request(&"mylist", &options);

        assert_eq!(
            &request.encode()[..],
            b"*15\r\n$4\r\nSORT\r\n$6\r\nmylist\r\n\
              $2\r\nBY\r\n$8\r\nweight_*\r\n\
              $5\r\nLIMIT\r\n$1\r\n0\r\n$2\r\n10\r\n\
              $3\r\nGET\r\n$8\r\nobject_*\r\n$3\r\nGET\r\n$1\r\n#\r\n\
              $4\r\nDESC\r\n$5\r\nALPHA\r\n\
              $5\r\nSTORE\r\n$4\r\ndest\r\n"
                .as_slice()
        );
    }

    #[test]
    fn score_range_omits_limit_unless_both_parts_given() {
        let request = score_range_request("ZRANGEBYSCORE", &"zs", 1.0, 2.0, false, None);
        assert_eq!(
            &request.encode()[..],
            b"*4\r\n$13\r\nZRANGEBYSCORE\r\n$2\r\nzs\r\n$1\r\n1\r\n$1\r\n2\r\n"
        );
    }

    #[test]
    fn score_range_with_scores_and_limit() {
        let request = score_range_request("ZRANGEBYSCORE", &"zs", 1.0, 2.5, true, Some((0, 3)));
        assert_eq!(
            &request.encode()[..],
            b"*8\r\n$13\r\nZRANGEBYSCORE\r\n$2\r\nzs\r\n$1\r\n1\r\n$3\r\n2.5\r\n\
              $10\r\nWITHSCORES\r\n$5\r\nLIMIT\r\n$1\r\n0\r\n$1\r\n3\r\n"
                .as_slice()
        );
    }

    #[test]
    fn blocking_pop_appends_timeout_last() {
        let request = blocking_pop_request("BLPOP", &["a", "b"].as_slice(), 5).unwrap();
        assert_eq!(
            &request.encode()[..],
            b"*4\r\n$5\r\nBLPOP\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\n5\r\n"
        );
    }

    #[test]
    fn blocking_pop_requires_a_key() {
        let keys: &[&str] = &[];
        let request = blocking_pop_request("BLPOP", &keys, 5);
        assert!(matches!(request, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn mapping_request_rejects_odd_argument_counts() {
        let pairs: &[(&str, &str)] = &[("k", "v")];
        assert!(mapping_request("MSET", &pairs).is_ok());

        let empty: &[(&str, &str)] = &[];
        assert!(matches!(
            mapping_request("MSET", &empty),
            Err(Error::InvalidArgument(_))
        ));
    }
}
