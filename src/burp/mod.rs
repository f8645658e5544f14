pub mod client;
pub mod codec;
pub mod parser;
pub mod transport;
pub mod types;

pub use client::{request_status, StatusDump, StatusScope};
pub use codec::{BurpCodec, Frame, FrameKind};
pub use parser::{parse, ParsedStatus};
pub use transport::{Connector, Session, TlsTransport};
pub use types::{BackupRecord, ClientMap, ClientRecord, RunStatus};
