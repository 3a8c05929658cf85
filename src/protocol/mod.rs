//! Cluster wire protocol
//!
//! Framing for the single ordered byte stream that carries every logical
//! sub-stream of a cluster link:
//!
//! ```text
//! +--------+---------------------------+
//! | op(1)  | opcode-specific payload   |
//! +--------+---------------------------+
//!
//! AUDIO / VIDEO        path\0 track\0 ts(u32) len(u32) payload
//! VIDEOTRACK/AUDIOTRACK path\0 track\0 codec(u8) len(u32) extra-data
//! SUBSCRIBE / UNSUBSCRIBE / PUBLISH / UNPUBLISH   path\0
//! SUMMARY              0 | 1 | 2 json\0
//! PULSE                (empty)
//! ```

pub mod codec;
pub mod constants;
pub mod message;

pub use codec::FrameReader;
pub use message::{Message, Opcode, Summary};
