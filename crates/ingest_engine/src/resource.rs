use ingest_core::{DateInterval, PageRequest};

/// Base URL of the NYC Open Data Socrata endpoints.
pub const NYC_OPEN_DATA_BASE_URL: &str = "https://data.cityofnewyork.us/resource/";

/// Row identity of a table. Rows sharing a primary key, or a merge key value,
/// describe the same entity across loads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableKeys {
    pub primary_key: Vec<String>,
    pub merge_key: Option<String>,
}

impl TableKeys {
    pub fn is_empty(&self) -> bool {
        self.primary_key.is_empty() && self.merge_key.is_none()
    }
}

/// One paginated dataset endpoint and the table it loads into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    /// Destination table name.
    pub name: String,
    /// Endpoint path relative to the base URL, e.g. `tg4x-b46p.json`.
    pub path: String,
    /// Column for `$order`; offset pagination is only stable over a fixed order.
    pub order: String,
    /// Optional SoQL `$where` predicate.
    pub filter: Option<String>,
    pub keys: TableKeys,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, path: impl Into<String>, order: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            order: order.into(),
            filter: None,
            keys: TableKeys::default(),
        }
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.keys.primary_key.push(column.into());
        self
    }

    pub fn with_merge_key(mut self, column: impl Into<String>) -> Self {
        self.keys.merge_key = Some(column.into());
        self
    }

    pub fn with_filter(mut self, predicate: impl Into<String>) -> Self {
        self.filter = Some(predicate.into());
        self
    }

    /// Query pairs for one page: `$limit`, `$offset`, `$order`, then `$where`.
    pub fn query_pairs(&self, request: PageRequest) -> Vec<(&'static str, String)> {
        let mut pairs: Vec<(&'static str, String)> = request.query_pairs().into();
        pairs.push(("$order", self.order.clone()));
        if let Some(filter) = &self.filter {
            pairs.push(("$where", filter.clone()));
        }
        pairs
    }
}

/// The NYC resources ingested by default. Only the 311 service requests are
/// filtered by creation date; the other two are small enough to take whole.
pub fn nyc_open_data_resources(window: DateInterval) -> Vec<ResourceSpec> {
    vec![
        ResourceSpec::new("service_requests_311", "erm2-nwe9.json", "created_date")
            .with_filter(window.between_predicate("created_date"))
            .with_primary_key("unique_key"),
        ResourceSpec::new("film_permits", "tg4x-b46p.json", "eventid").with_primary_key("eventid"),
        ResourceSpec::new("staten_island_ferry_ridership_counts", "6eng-46dm.json", "date")
            .with_merge_key("date"),
    ]
}
