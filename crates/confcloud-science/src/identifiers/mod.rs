pub mod doi;
pub mod openreview;
pub mod proceedings;
pub mod route;

pub use doi::Doi;
pub use openreview::extract_openreview_id;
pub use proceedings::{ProceedingsRef, ProceedingsTrack, extract_proceedings_hash};
pub use route::{IdentifierRoute, RouteSet, classify};
