pub mod error;
pub mod fanout;
pub mod filter;
pub mod query;
pub mod registry;
pub mod subscriptions;
pub mod version;
pub mod watcher;

pub use nmos_query_proto as proto;

pub use fanout::FanOutEngine;
pub use query::QueryService;
pub use registry::RegistryAdapter;
pub use subscriptions::SubscriptionRegistry;
pub use watcher::ChangeWatcher;
