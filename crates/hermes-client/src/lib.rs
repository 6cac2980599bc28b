pub mod extractor;
pub mod transport;

pub use extractor::SelectorExtractor;
pub use transport::{ReqwestSession, ReqwestTransport};
