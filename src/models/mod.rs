mod page;

pub use page::{NewPage, Page, PageContent, RelatedPage, StoreStats};
