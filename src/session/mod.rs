//! Session bookkeeping shared by the upload and chat surfaces.

mod store;

pub use store::{RegisterOutcome, Session, SessionError, SessionStore, UploadPermit};
