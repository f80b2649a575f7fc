pub mod http;
pub mod wifi;

pub use http::EspHttpTransport;
pub use wifi::WifiManager;
