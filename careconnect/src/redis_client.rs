use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// JSON documents under a shared key prefix, each with its own expiry.
#[derive(Clone)]
pub struct RedisClient {
    connection: ConnectionManager,
    namespace: String,
}

impl RedisClient {
    pub async fn connect(redis_url: &str, namespace: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("invalid REDIS_URL")?;
        let mut connection = client
            .get_tokio_connection_manager()
            .await
            .context("could not reach redis")?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut connection)
            .await
            .context("redis did not answer PING")?;
        Ok(Self {
            connection,
            namespace: namespace.to_string(),
        })
    }

    pub fn key(&self, id: &str) -> String {
        namespaced(&self.namespace, id)
    }

    /// Writes `value`; with no TTL the key never expires.
    pub async fn put_json<T: Serialize>(&self, id: &str, value: &T, ttl_secs: Option<u64>) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        let mut connection = self.connection.clone();
        let written = match ttl_secs {
            Some(secs) => connection.set_ex::<_, _, ()>(self.key(id), payload, secs).await,
            None => connection.set::<_, _, ()>(self.key(id), payload).await,
        };
        written.with_context(|| format!("failed to write {}", id))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>> {
        let mut connection = self.connection.clone();
        let payload: Option<String> = connection
            .get(self.key(id))
            .await
            .with_context(|| format!("failed to read {}", id))?;
        payload
            .map(|json| serde_json::from_str(&json).with_context(|| format!("corrupt value for {}", id)))
            .transpose()
    }

    /// Returns whether a value was actually removed.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut connection = self.connection.clone();
        let removed: u64 = connection
            .del(self.key(id))
            .await
            .with_context(|| format!("failed to delete {}", id))?;
        Ok(removed > 0)
    }
}

fn namespaced(namespace: &str, id: &str) -> String {
    format!("{}:{}", namespace, id)
}

#[cfg(test)]
mod tests {
    use super::namespaced;

    #[test]
    fn keys_carry_the_namespace() {
        assert_eq!(namespaced("careconnect:thread", "user-1"), "careconnect:thread:user-1");
    }
}
