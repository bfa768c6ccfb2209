//! Client for the miio LAN protocol spoken by Xiaomi/Yeelight smart lights.
//!
//! Implements the binary frame codec, token-based key derivation, the hello
//! handshake and the stamped, encrypted JSON command exchange. Payloads are
//! AES-128-CBC encrypted with keys derived from the device token via MD5, and
//! every command frame carries an MD5 tag computed over the frame with the
//! token in its checksum field.

pub mod config;
pub mod control;
pub mod crypto;
pub mod device;
pub mod e2e_common;
pub mod error;
pub mod handshake;
pub mod messages;
pub mod sdk;
pub mod session;

pub use config::{ClientConfig, ConfigError};
pub use control::{ControlCrypto, ControlResponder};
pub use crypto::{derive_key_material, SessionKeys, Token};
pub use device::{DeviceConfig, DeviceServer, ReplyMode};
pub use error::{MiioError, Result};
pub use handshake::{DatagramTransport, HelloReply};
pub use messages::{Frame, Param, DEVICE_PORT};
pub use sdk::MiioClient;
pub use session::{LoopbackTransport, MiioSession};
