//! In-memory service clients for the order flow.

pub mod cms;
pub mod ros;
pub mod wms;

pub use cms::InMemoryCmsClient;
pub use ros::InMemoryRosClient;
pub use wms::InMemoryWmsClient;
