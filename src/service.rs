/*
 * Dashboard service that ties the API client to the table, chart and task views
 */

use std::sync::Arc;
use tracing::{info, warn};
use crate::{
    analytics::OpportunityFilter,
    api::{self, ApiClient, LogQuery, OpportunityQuery, PriceComparisonQuery, TaskList, TaskListQuery, TaskLogs},
    chart::PriceChart,
    config::Config,
    models::{LoadState, Result},
    table::{OpportunityTable, SortSpec},
    tasks::{ApiTaskExecutor, TaskBoard},
};

const CONSISTENCY_EPSILON: f64 = 1e-6;

pub struct DashboardService {
    config: Config,
    client: ApiClient,
    tasks: Arc<TaskBoard>,
}

impl DashboardService {
    pub fn new(config: Config) -> Result<Self> {
        info!("Initializing dashboard service against {}", config.backend.base_url);

        let client = ApiClient::new(&config.backend)?;
        let tasks = Arc::new(TaskBoard::new(Arc::new(ApiTaskExecutor::new(client.clone()))));

        Ok(Self { config, client, tasks })
    }

    #[must_use]
    pub fn with_task_board(mut self, tasks: Arc<TaskBoard>) -> Self {
        self.tasks = tasks;
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    #[must_use]
    pub fn tasks(&self) -> Arc<TaskBoard> {
        self.tasks.clone()
    }

    /// Fetches opportunities and builds the table view. The backend page size
    /// is left to the query; local paging uses the configured page size.
    pub async fn load_opportunities(
        &self,
        query: &OpportunityQuery,
        sort: SortSpec,
        filter: OpportunityFilter,
    ) -> LoadState<OpportunityTable> {
        let rows = match self.client.get_opportunities(query).await {
            Ok(response) => match response.data.as_ref().map(api::parse_opportunities) {
                Some(Ok(rows)) => rows,
                Some(Err(e)) => return LoadState::Failed(e),
                None => Vec::new(),
            },
            Err(e) => {
                warn!("Loading opportunities failed: {}", e);
                return LoadState::Failed(e);
            }
        };

        let inconsistent = rows.iter().filter(|o| !o.is_consistent(CONSISTENCY_EPSILON)).count();
        if inconsistent > 0 {
            warn!("{} opportunities do not match gross = |dex - cex|, net = gross - gas - fees", inconsistent);
        }

        if rows.is_empty() {
            info!("No opportunities returned");
            return LoadState::Empty;
        }

        info!("Loaded {} opportunities", rows.len());
        let table = OpportunityTable::new(rows, self.config.view.page_size)
            .with_sort(sort)
            .with_filter(filter);
        LoadState::Loaded(table)
    }

    pub async fn load_price_chart(&self, query: &PriceComparisonQuery) -> LoadState<PriceChart> {
        let points = match self.client.get_price_comparison(query).await {
            Ok(response) => match response.data.as_ref().map(api::parse_price_points) {
                Some(Ok(points)) => points,
                Some(Err(e)) => return LoadState::Failed(e),
                None => Vec::new(),
            },
            Err(e) => {
                warn!("Loading price comparison failed: {}", e);
                return LoadState::Failed(e);
            }
        };

        if points.is_empty() {
            info!("No price data between {} and {}", query.start_time, query.end_time);
            return LoadState::Empty;
        }

        info!("Loaded {} price points", points.len());
        LoadState::Loaded(PriceChart::from_points(&points))
    }

    pub async fn load_tasks(&self, query: &TaskListQuery) -> LoadState<TaskList> {
        match self.client.get_tasks(query).await {
            Ok(response) => match response.into_data() {
                Some(list) if !list.items.is_empty() => LoadState::Loaded(list),
                _ => LoadState::Empty,
            },
            Err(e) => {
                warn!("Loading tasks failed: {}", e);
                LoadState::Failed(e)
            }
        }
    }

    pub async fn load_task_logs(&self, task_id: &str, query: &LogQuery) -> LoadState<TaskLogs> {
        match self.client.get_task_logs(task_id, query).await {
            Ok(response) => match response.into_data() {
                Some(logs) if !logs.items.is_empty() => LoadState::Loaded(logs),
                _ => LoadState::Empty,
            },
            Err(e) => {
                warn!("Loading logs for task {} failed: {}", task_id, e);
                LoadState::Failed(e)
            }
        }
    }
}
