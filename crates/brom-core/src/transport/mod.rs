//! Transport layer module.

pub mod mock;
pub mod nusb;
pub mod stream;
pub mod traits;

pub use mock::MockTransport;
pub use nusb::NusbTransport;
pub use stream::ByteStream;
pub use traits::{TransportError, UsbTransport};
