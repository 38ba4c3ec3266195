//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_lease_store;
mod in_memory_trigger_queue;
mod postgres_lease_store;
mod redis_lease_store;
mod redis_trigger_queue;

pub use in_memory_lease_store::InMemoryLeaseStore;
pub use in_memory_trigger_queue::InMemoryTriggerQueue;
pub use postgres_lease_store::PostgresLeaseStore;
pub use redis_lease_store::RedisLeaseStore;
pub use redis_trigger_queue::RedisTriggerQueue;
