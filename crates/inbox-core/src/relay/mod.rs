pub mod connector;
pub(crate) mod peer;

pub use connector::{RelayConnection, RelayConnector, RelayIncoming, SdkConnector};
