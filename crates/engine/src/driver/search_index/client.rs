//! Search-index transport.

use std::time::Duration;

use async_trait::async_trait;
use redis::Client as RedisClient;

use crate::error::{EngineError, EngineResult};
use crate::query::SortDirection;

const BACKEND: &str = "redisearch";

/// One `FT.SEARCH` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub index: String,
    pub query: String,

    /// Fields to return. Empty returns whole documents.
    pub return_fields: Vec<String>,

    pub sort: Option<(String, SortDirection)>,
    pub offset: u64,
    pub limit: u64,
}

/// Documents as field/value pairs plus the index's total match count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchReply {
    pub total: u64,
    pub documents: Vec<Vec<(String, String)>>,
}

/// One `FT.AGGREGATE` facet call: group by `field`, count, sort by count.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRequest {
    pub index: String,
    pub query: String,
    pub field: String,
    pub offset: u64,
    pub limit: u64,
}

/// Search-index commands used by the driver.
#[async_trait]
pub trait SearchIndexClient: Send + Sync {
    async fn search(&self, request: SearchRequest) -> EngineResult<SearchReply>;

    /// Rows of `field`/`count` pairs.
    async fn aggregate(&self, request: AggregateRequest) -> EngineResult<Vec<Vec<(String, String)>>>;
}

/// RediSearch over a multiplexed connection.
#[derive(Debug, Clone)]
pub struct RedisSearchClient {
    redis: RedisClient,
    timeout: Duration,
}

impl RedisSearchClient {
    /// Default per-command timeout (default: 5 seconds).
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(redis: RedisClient) -> Self {
        Self {
            redis,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Open a client from a `redis://` URL.
    pub fn open(url: &str) -> EngineResult<Self> {
        let redis = RedisClient::open(url)
            .map_err(|e| EngineError::DriverConfiguration(format!("invalid redis URL: {e}")))?;
        Ok(Self::new(redis))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, cmd: redis::Cmd) -> EngineResult<redis::Value> {
        let call = async {
            let mut conn = self.redis.get_multiplexed_async_connection().await?;
            let value: redis::Value = cmd.query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>(value)
        };
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(EngineError::backend(BACKEND))?
            .map_err(EngineError::backend(BACKEND))
    }
}

pub(crate) fn search_command(request: &SearchRequest) -> redis::Cmd {
    let mut cmd = redis::cmd("FT.SEARCH");
    cmd.arg(&request.index).arg(&request.query);
    if !request.return_fields.is_empty() {
        cmd.arg("RETURN").arg(request.return_fields.len());
        for field in &request.return_fields {
            cmd.arg(field);
        }
    }
    if let Some((field, direction)) = &request.sort {
        let direction = match direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        cmd.arg("SORTBY").arg(field).arg(direction);
    }
    cmd.arg("LIMIT").arg(request.offset).arg(request.limit);
    cmd
}

pub(crate) fn aggregate_command(request: &AggregateRequest) -> redis::Cmd {
    let group = format!("@{}", request.field);
    let mut cmd = redis::cmd("FT.AGGREGATE");
    cmd.arg(&request.index)
        .arg(&request.query)
        .arg("GROUPBY")
        .arg(1)
        .arg(&group)
        .arg("REDUCE")
        .arg("COUNT")
        .arg(0)
        .arg("AS")
        .arg("count")
        .arg("SORTBY")
        .arg(4)
        .arg("@count")
        .arg("DESC")
        .arg(&group)
        .arg("ASC")
        .arg("LIMIT")
        .arg(request.offset)
        .arg(request.limit);
    cmd
}

#[async_trait]
impl SearchIndexClient for RedisSearchClient {
    async fn search(&self, request: SearchRequest) -> EngineResult<SearchReply> {
        let reply = self.run(search_command(&request)).await?;
        parse_search_reply(reply)
    }

    async fn aggregate(&self, request: AggregateRequest) -> EngineResult<Vec<Vec<(String, String)>>> {
        let reply = self.run(aggregate_command(&request)).await?;
        parse_aggregate_reply(reply)
    }
}

fn text(value: &redis::Value) -> Option<String> {
    match value {
        redis::Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        redis::Value::SimpleString(s) => Some(s.clone()),
        redis::Value::Int(i) => Some(i.to_string()),
        redis::Value::Double(d) => Some(d.to_string()),
        _ => None,
    }
}

fn pairs(value: &redis::Value) -> EngineResult<Vec<(String, String)>> {
    let redis::Value::Array(items) = value else {
        return Err(EngineError::upstream(BACKEND, "expected a field/value array"));
    };
    Ok(items
        .chunks(2)
        .filter_map(|chunk| match chunk {
            [name, value] => Some((text(name)?, text(value).unwrap_or_default())),
            _ => None,
        })
        .collect())
}

fn total(value: Option<&redis::Value>) -> EngineResult<u64> {
    match value {
        Some(redis::Value::Int(n)) => Ok((*n).max(0) as u64),
        _ => Err(EngineError::upstream(BACKEND, "missing result count")),
    }
}

/// `[total, id, [field, value, ...], id, [...], ...]`
pub(crate) fn parse_search_reply(reply: redis::Value) -> EngineResult<SearchReply> {
    let redis::Value::Array(items) = reply else {
        return Err(EngineError::upstream(BACKEND, "FT.SEARCH reply is not an array"));
    };
    let total = total(items.first())?;
    let mut documents = Vec::new();
    for chunk in items[1..].chunks(2) {
        match chunk {
            [_, fields] => documents.push(pairs(fields)?),
            _ => return Err(EngineError::upstream(BACKEND, "document without fields")),
        }
    }
    Ok(SearchReply { total, documents })
}

/// `[groups, [field, value, "count", n], ...]`
pub(crate) fn parse_aggregate_reply(reply: redis::Value) -> EngineResult<Vec<Vec<(String, String)>>> {
    let redis::Value::Array(items) = reply else {
        return Err(EngineError::upstream(BACKEND, "FT.AGGREGATE reply is not an array"));
    };
    total(items.first())?;
    items[1..].iter().map(pairs).collect()
}
