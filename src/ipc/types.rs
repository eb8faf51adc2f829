use serde::Deserialize;

use crate::api::ResultsApi;
use crate::config::AppConfig;
use crate::drafts::ResultDraftStore;
use crate::model::ResultRecord;
use crate::publish::PublicationWorkflow;
use crate::selection::SelectionSet;
use crate::view::{ResultQuery, ViewState};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Everything one UI session owns. Nothing here is persisted; a refetch or a
/// new draft batch replaces it.
pub struct AppState {
    pub config: AppConfig,
    pub api: Box<dyn ResultsApi>,
    pub drafts: Option<ResultDraftStore>,
    pub results: Option<Vec<ResultRecord>>,
    pub query: ResultQuery,
    pub view: ViewState,
    pub selection: SelectionSet,
    pub publish: PublicationWorkflow,
}

impl AppState {
    pub fn new(config: AppConfig, api: Box<dyn ResultsApi>) -> Self {
        let view = ViewState {
            page_size: config.view.page_size,
            ..ViewState::default()
        };
        Self {
            config,
            api,
            drafts: None,
            results: None,
            query: ResultQuery::default(),
            view,
            selection: SelectionSet::new(),
            publish: PublicationWorkflow::new(),
        }
    }
}
