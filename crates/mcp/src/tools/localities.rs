// search_localities: the bridge to the TrustyData locality-search API.

use crate::protocol::{CallToolResult, ToolContent, ToolSchema};
use crate::tools::{
    json_schema_array, json_schema_boolean, json_schema_integer, json_schema_object,
    json_schema_string, Tool,
};
use serde::Deserialize;
use std::time::Duration;
use trustydata_core::GatewayError;

const MAX_LIMIT: u64 = 1000;

/// Tool that queries the TrustyData `/locality/search` endpoint and renders
/// the result as one markdown text block.
pub struct SearchLocalitiesTool {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl SearchLocalitiesTool {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("trustydata-mcp/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            timeout,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchArgs {
    q: Option<String>,
    limit: Option<u64>,
    postal_code: Option<Vec<String>>,
    department_code: Option<Vec<String>>,
    department_name: Option<Vec<String>>,
    region_code: Option<Vec<String>>,
    region_name: Option<Vec<String>>,
    population_min: Option<u64>,
    population_max: Option<u64>,
    details: Option<bool>,
}

impl SearchArgs {
    fn validate(&self) -> Result<(), GatewayError> {
        if let Some(limit) = self.limit {
            if limit == 0 || limit > MAX_LIMIT {
                return Err(GatewayError::InvalidParams(format!(
                    "limit must be between 1 and {MAX_LIMIT}, got {limit}"
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.population_min, self.population_max) {
            if min > max {
                return Err(GatewayError::InvalidParams(format!(
                    "population_min ({min}) exceeds population_max ({max})"
                )));
            }
        }
        Ok(())
    }

    /// 1:1 mapping of validated arguments onto provider query parameters.
    /// Array filters repeat the key, which the provider expects.
    fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(q) = &self.q {
            query.push(("q", q.clone()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        for (key, values) in [
            ("postal_code", &self.postal_code),
            ("department_code", &self.department_code),
            ("department_name", &self.department_name),
            ("region_code", &self.region_code),
            ("region_name", &self.region_name),
        ] {
            if let Some(values) = values {
                for value in values {
                    query.push((key, value.clone()));
                }
            }
        }
        if let Some(min) = self.population_min {
            query.push(("population_min", min.to_string()));
        }
        if let Some(max) = self.population_max {
            query.push(("population_max", max.to_string()));
        }
        if let Some(details) = self.details {
            query.push(("details", details.to_string()));
        }
        query
    }
}

// Provider response shapes. Every field is optional so a partial payload
// still renders instead of failing the whole call.

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    count: u64,
    #[serde(default)]
    choices: Vec<Locality>,
}

#[derive(Debug, Deserialize)]
struct Locality {
    nom_commune: Option<String>,
    code_postal: Option<String>,
    cog: Option<Cog>,
    #[serde(default)]
    population: Vec<PopulationCount>,
    departement: Option<AdminArea>,
    region: Option<AdminArea>,
}

#[derive(Debug, Deserialize)]
struct Cog {
    insee: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdminArea {
    id: Option<String>,
    libelle: Option<String>,
    #[serde(default)]
    population: Vec<PopulationCount>,
}

#[derive(Debug, Deserialize)]
struct PopulationCount {
    periode: Option<String>,
    totale: Option<i64>,
    municipale: Option<i64>,
    comptee_a_part: Option<i64>,
}

fn fmt_opt(value: &Option<i64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

fn push_population_lines(out: &mut String, label: &str, counts: &[PopulationCount]) {
    for count in counts {
        let periode = count.periode.as_deref().unwrap_or("N/A");
        out.push_str(&format!(
            "   - Population {label} ({periode}): totale={}, municipale={}, comptée à part={}\n",
            fmt_opt(&count.totale),
            fmt_opt(&count.municipale),
            fmt_opt(&count.comptee_a_part),
        ));
    }
}

/// Deterministic markdown rendering of a provider payload.
fn render_results(response: &SearchResponse) -> String {
    if response.status != "OK" || response.count == 0 {
        return format!(
            "Status: {}\nMessage: {}\nNo localities found matching your criteria.",
            if response.status.is_empty() {
                "UNKNOWN"
            } else {
                &response.status
            },
            response.message,
        );
    }

    let plural = if response.count == 1 { "y" } else { "ies" };
    let mut out = format!("Found {} localit{plural}:\n\n", response.count);

    for (idx, locality) in response.choices.iter().enumerate() {
        let name = locality.nom_commune.as_deref().unwrap_or("N/A");
        out.push_str(&format!("{}. **{name}**\n", idx + 1));

        if let Some(insee) = locality.cog.as_ref().and_then(|c| c.insee.as_deref()) {
            out.push_str(&format!("   - INSEE Code: {insee}\n"));
        }
        if let Some(postal) = locality.code_postal.as_deref() {
            out.push_str(&format!("   - Postal Code: {postal}\n"));
        }
        push_population_lines(&mut out, "ville", &locality.population);

        if let Some(dept) = &locality.departement {
            out.push_str(&format!(
                "   - Department: {} ({})\n",
                dept.libelle.as_deref().unwrap_or("N/A"),
                dept.id.as_deref().unwrap_or("N/A"),
            ));
            push_population_lines(&mut out, "département", &dept.population);
        }

        if let Some(region) = &locality.region {
            out.push_str(&format!(
                "   - Region: {} ({})\n",
                region.libelle.as_deref().unwrap_or("N/A"),
                region.id.as_deref().unwrap_or("N/A"),
            ));
            push_population_lines(&mut out, "région", &region.population);
        }

        out.push('\n');
    }

    out.trim_end().to_string()
}

#[async_trait::async_trait]
impl Tool for SearchLocalitiesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "search_localities".to_string(),
            description: "Search for French localities (cities, towns, villages) with \
                comprehensive filtering options and demographic data. Combines La Poste postal \
                data with official INSEE administrative records. Search by name (q), postal \
                code(s), department, region, or population range; set details=true for full \
                demographic information. Returns up to 1000 results per query."
                .to_string(),
            input_schema: json_schema_object(
                serde_json::json!({
                    "q": json_schema_string(
                        "Search query for locality name (e.g., 'Paris', 'Lyon', 'Marseille')"
                    ),
                    "limit": json_schema_integer(
                        "Maximum number of results to return (1-1000, default: 1000)"
                    ),
                    "postal_code": json_schema_array(
                        json_schema_string("Postal code"),
                        "Filter by postal code(s) (e.g., ['75001', '62930'])"
                    ),
                    "department_code": json_schema_array(
                        json_schema_string("Department INSEE code"),
                        "Filter by department INSEE code(s) (e.g., ['75', '13'])"
                    ),
                    "department_name": json_schema_array(
                        json_schema_string("Department name"),
                        "Filter by department name(s) (e.g., ['Paris', 'Rhône'])"
                    ),
                    "region_code": json_schema_array(
                        json_schema_string("Region INSEE code"),
                        "Filter by region INSEE code(s) (e.g., ['11'] for Île-de-France)"
                    ),
                    "region_name": json_schema_array(
                        json_schema_string("Region name in UPPERCASE"),
                        "Filter by region name(s) (e.g., ['BRETAGNE', 'OCCITANIE'])"
                    ),
                    "population_min": json_schema_integer("Minimum population threshold"),
                    "population_max": json_schema_integer("Maximum population threshold"),
                    "details": json_schema_boolean(
                        "Include detailed administrative information (default: true)"
                    ),
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult, GatewayError> {
        let args: SearchArgs = if arguments.is_null() {
            SearchArgs::default()
        } else {
            serde_json::from_value(arguments)
                .map_err(|e| GatewayError::InvalidParams(e.to_string()))?
        };
        args.validate()?;

        let query = args.to_query();
        tracing::info!("searching localities with {} parameter(s)", query.len());

        let request = self
            .client
            .get(format!("{}/locality/search", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .query(&query)
            .send();

        // The client carries the same timeout for the read path; this guard
        // bounds the whole exchange so a stalled provider cannot hang the call.
        let response = match tokio::time::timeout(self.timeout, request).await {
            Err(_) => return Err(GatewayError::Timeout),
            Ok(Err(e)) if e.is_timeout() => return Err(GatewayError::Timeout),
            Ok(Err(e)) => return Err(GatewayError::Upstream(format!("request failed: {e}"))),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream(format!(
                "API error ({status}): {body}"
            )));
        }

        let payload: SearchResponse = match response.json().await {
            Ok(payload) => payload,
            Err(e) if e.is_timeout() => return Err(GatewayError::Timeout),
            Err(e) => {
                return Err(GatewayError::Upstream(format!(
                    "invalid provider response: {e}"
                )))
            }
        };

        Ok(CallToolResult {
            content: vec![ToolContent::text(render_results(&payload))],
            is_error: None,
        })
    }
}
