use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Page, PageContent, RelatedPage, StoreStats};
use crate::services::IngestReport;

/// Everything the extension can ask of the host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Request {
    PageContent {
        data: PageContent,
    },
    SearchPages {
        #[serde(default)]
        query: String,
    },
    GetAllPages,
    GetStats,
    DeletePage {
        page_id: i64,
    },
    ClearAll,
    GetPage {
        page_id: i64,
    },
    GetPagesByTag {
        tag: String,
    },
    FindRelated {
        tags: Vec<String>,
        #[serde(default)]
        exclude_url: Option<String>,
    },
}

/// A request as it arrives, with the caller's correlation id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incoming {
    #[serde(default)]
    pub request_id: Option<Value>,
    #[serde(flatten)]
    pub request: Request,
}

impl Incoming {
    /// Parse a frame. On failure, still recover the request id if the frame
    /// was a JSON object so the error can be routed back.
    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, (Option<Value>, String)> {
        serde_json::from_slice(bytes).map_err(|e| {
            let request_id = serde_json::from_slice::<Value>(bytes)
                .ok()
                .and_then(|v| v.get("requestId").cloned());
            (request_id, format!("Invalid message: {}", e))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ingested(IngestReport),
    Pages { results: Vec<Page> },
    Page { page: Option<Page> },
    Related { results: Vec<RelatedPage> },
    Stats { stats: StoreStats },
    Deleted { deleted: bool },
    Done {},
    Failed { error: String },
}

impl Response {
    pub fn failed(error: impl ToString) -> Self {
        Response::Failed {
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Response::Failed { .. })
    }

    /// The same response with stored page text dropped, for listings too
    /// large to send whole.
    pub fn without_full_text(self) -> Self {
        fn strip(mut page: Page) -> Page {
            page.full_text.clear();
            page
        }

        match self {
            Response::Pages { results } => Response::Pages {
                results: results.into_iter().map(strip).collect(),
            },
            Response::Page { page } => Response::Page {
                page: page.map(strip),
            },
            Response::Related { results } => Response::Related {
                results: results
                    .into_iter()
                    .map(|mut related| {
                        related.page = strip(related.page);
                        related
                    })
                    .collect(),
            },
            Response::Ingested(mut report) => {
                for related in &mut report.related {
                    related.page.full_text.clear();
                }
                Response::Ingested(report)
            }
            other => other,
        }
    }
}

/// The envelope written back: `{requestId?, success, ...payload}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outgoing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
    pub success: bool,
    #[serde(flatten)]
    pub response: Response,
}

impl Outgoing {
    pub fn new(request_id: Option<Value>, response: Response) -> Self {
        Self {
            request_id,
            success: response.is_success(),
            response,
        }
    }
}
