pub mod pcm;
pub mod session;
pub mod transport;

pub use session::{PendingQuery, QueryResult, Session};
pub use transport::{HttpTransport, RecognitionTransport, MEDIA_TYPE};
