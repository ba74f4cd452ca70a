//! Mysa cloud API: wire types, the async client and realtime event delivery.

mod api;
mod http;
mod realtime;
mod types;

#[cfg(test)]
pub use api::MockMysaApi;
pub use api::MysaApi;
pub use api::MysaError;
pub use http::DEFAULT_BASE_URL;
pub use http::DEFAULT_COGNITO_URL;
pub use http::HttpMysaClient;
pub use http::HttpMysaClientBuilder;
pub use realtime::diff_device_state;
pub use types::Device;
pub use types::DeviceFirmwares;
pub use types::DeviceState;
pub use types::DeviceStates;
pub use types::Devices;
pub use types::FirmwareDevice;
pub use types::MysaEvent;
pub use types::MysaSession;
pub use types::Reading;
pub use types::SetDeviceState;
pub use types::StateChange;
pub use types::Status;
