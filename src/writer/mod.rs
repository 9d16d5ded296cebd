pub mod encoding;
pub mod error;
pub mod session;
pub mod tmpname;
pub mod validate;

pub use encoding::{Encoding, ErrorPolicy};
pub use error::WriterError;
pub use session::{AtomicWriter, DryRun, OpenMode, OpenOptions, SessionState, WriteSession};
pub use validate::{
    MinimumSizeValidator, SimilarLineCountValidator, SimilarSizeValidator, Validator,
};
