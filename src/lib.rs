pub mod codec;
pub mod contract;
pub mod document;
pub mod error;
pub mod merge;
pub mod node;
pub mod registry;
pub mod stream;
pub mod token;

pub use contract::{Contract, ContractKind, TypeShape, TypeToken};
pub use document::{CloneSettings, Document};
pub use error::ArborError;
pub use merge::{MergeArrayHandling, MergeSettings};
pub use node::{Content, Key, LineInfo, NodeId, NodeType, Scalar};
pub use registry::ContractRegistry;
pub use stream::LoadSettings;
pub use token::{Token, TokenBuffer, TokenKind, TokenReader, TokenWriter};
