//! Redis-backed metadata backend: one hash per record key.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use rolestore_application::{MetadataBackend, MetadataRecord, RecordWrite, WriteCondition};
use rolestore_core::{AppError, AppResult, ObjVersion};
use uuid::Uuid;

use crate::record_attrs::{decode_attrs, encode_attrs};

const PUT_RECORD_SCRIPT: &str = r#"
local exists = redis.call('EXISTS', KEYS[1]) == 1
local mode = ARGV[1]

if mode == 'exclusive' and exists then
  return {-1, ''}
end

if mode == 'if_version' then
  if not exists then
    return {-2, ''}
  end
  local ver = redis.call('HGET', KEYS[1], 'ver')
  local tag = redis.call('HGET', KEYS[1], 'tag')
  if ver ~= ARGV[2] or tag ~= ARGV[3] then
    return {-2, tag .. ':' .. ver}
  end
end

local ver = 1
local tag = ARGV[4]
if exists then
  ver = redis.call('HINCRBY', KEYS[1], 'ver', 1)
  tag = redis.call('HGET', KEYS[1], 'tag')
end

redis.call('HSET', KEYS[1], 'data', ARGV[5], 'attrs', ARGV[6], 'mtime', ARGV[7], 'ver', ver, 'tag', tag)
return {ver, tag}
"#;

const REMOVE_RECORD_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end

if ARGV[1] == 'if_version' then
  local ver = redis.call('HGET', KEYS[1], 'ver')
  local tag = redis.call('HGET', KEYS[1], 'tag')
  if ver ~= ARGV[2] or tag ~= ARGV[3] then
    return -1
  end
end

return redis.call('DEL', KEYS[1])
"#;

const SCAN_BATCH_SIZE: usize = 500;

/// Redis implementation of the metadata backend port.
///
/// Conditional writes and removals run as Lua scripts so the version check
/// and the write are one atomic step on the server.
#[derive(Clone)]
pub struct RedisMetadataBackend {
    client: redis::Client,
    key_prefix: String,
}

impl RedisMetadataBackend {
    /// Creates a backend with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:{key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Backend(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl MetadataBackend for RedisMetadataBackend {
    async fn get(&self, key: &str) -> AppResult<MetadataRecord> {
        let mut connection = self.connection().await?;
        let fields: HashMap<String, Vec<u8>> = connection
            .hgetall(self.key_for(key))
            .await
            .map_err(|error| {
                AppError::Backend(format!("failed to read metadata record '{key}': {error}"))
            })?;

        if fields.is_empty() {
            return Err(AppError::NotFound(format!(
                "metadata record '{key}' does not exist"
            )));
        }

        record_from_fields(key, fields)
    }

    async fn put(
        &self,
        key: &str,
        write: RecordWrite,
        condition: WriteCondition,
    ) -> AppResult<ObjVersion> {
        let (mode, expected_ver, expected_tag) = match &condition {
            WriteCondition::Unconditional => ("unconditional", String::new(), String::new()),
            WriteCondition::Exclusive => ("exclusive", String::new(), String::new()),
            WriteCondition::IfVersion(expected) => {
                ("if_version", expected.ver.to_string(), expected.tag.clone())
            }
        };
        let attrs = encode_attrs(&write.attrs)?;
        let fresh_tag = Uuid::new_v4().simple().to_string();

        let mut connection = self.connection().await?;
        let (ver, tag): (i64, String) = Script::new(PUT_RECORD_SCRIPT)
            .key(self.key_for(key))
            .arg(mode)
            .arg(expected_ver)
            .arg(expected_tag)
            .arg(fresh_tag)
            .arg(write.data.as_ref())
            .arg(attrs)
            .arg(write.mtime.to_rfc3339())
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Backend(format!("failed to write metadata record '{key}': {error}"))
            })?;

        match ver {
            -1 => Err(AppError::AlreadyExists(format!(
                "metadata record '{key}' already exists"
            ))),
            -2 if tag.is_empty() => Err(AppError::Conflict(format!(
                "metadata record '{key}' does not exist"
            ))),
            -2 => Err(AppError::Conflict(format!(
                "metadata record '{key}' is at version {tag}"
            ))),
            _ => {
                let ver = u64::try_from(ver).map_err(|error| {
                    AppError::Decode(format!("invalid redis record version {ver}: {error}"))
                })?;
                Ok(ObjVersion::new(ver, tag))
            }
        }
    }

    async fn remove(&self, key: &str, expected: Option<&ObjVersion>) -> AppResult<()> {
        let (mode, expected_ver, expected_tag) = match expected {
            Some(expected) => ("if_version", expected.ver.to_string(), expected.tag.clone()),
            None => ("unconditional", String::new(), String::new()),
        };

        let mut connection = self.connection().await?;
        let outcome: i64 = Script::new(REMOVE_RECORD_SCRIPT)
            .key(self.key_for(key))
            .arg(mode)
            .arg(expected_ver)
            .arg(expected_tag)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Backend(format!("failed to remove metadata record '{key}': {error}"))
            })?;

        match outcome {
            0 => Err(AppError::NotFound(format!(
                "metadata record '{key}' does not exist"
            ))),
            -1 => Err(AppError::Conflict(format!(
                "metadata record '{key}' changed since it was read"
            ))),
            _ => Ok(()),
        }
    }

    async fn list_keys(&self, prefix: &str) -> AppResult<Vec<String>> {
        let namespace = self.key_for("");
        let pattern = format!("{}*", escape_glob(self.key_for(prefix).as_str()));
        let mut connection = self.connection().await?;

        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern.as_str())
                .arg("COUNT")
                .arg(SCAN_BATCH_SIZE)
                .query_async(&mut connection)
                .await
                .map_err(|error| {
                    AppError::Backend(format!("failed to scan metadata keys: {error}"))
                })?;

            keys.extend(
                batch
                    .into_iter()
                    .filter_map(|key| key.strip_prefix(namespace.as_str()).map(str::to_owned)),
            );

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

fn record_from_fields(key: &str, mut fields: HashMap<String, Vec<u8>>) -> AppResult<MetadataRecord> {
    let mut text_field = |name: &str| -> AppResult<String> {
        let raw = fields.remove(name).ok_or_else(|| {
            AppError::Decode(format!("metadata record '{key}' is missing field '{name}'"))
        })?;
        String::from_utf8(raw).map_err(|error| {
            AppError::Decode(format!(
                "metadata record '{key}' field '{name}' is not UTF-8: {error}"
            ))
        })
    };

    let ver = text_field("ver")?;
    let tag = text_field("tag")?;
    let mtime = text_field("mtime")?;
    let attrs = text_field("attrs")?;

    let ver = ver.parse::<u64>().map_err(|error| {
        AppError::Decode(format!("metadata record '{key}' has invalid version: {error}"))
    })?;
    let mtime = DateTime::parse_from_rfc3339(mtime.as_str())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| {
            AppError::Decode(format!("metadata record '{key}' has invalid mtime: {error}"))
        })?;
    let data = fields.remove("data").ok_or_else(|| {
        AppError::Decode(format!("metadata record '{key}' is missing field 'data'"))
    })?;

    Ok(MetadataRecord {
        data: Bytes::from(data),
        attrs: decode_attrs(attrs.as_str())?,
        version: ObjVersion::new(ver, tag),
        mtime,
    })
}

fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        if matches!(character, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}
