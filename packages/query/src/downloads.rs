//! Download links for the rows behind an aggregation.
//!
//! A link re-runs the aggregation SQL through the Carto SQL API export
//! endpoint, one link per output format. The summary date columns are
//! dropped. Legacy links also carry the alert geometry so spatial formats
//! have something to draw.

use std::sync::Arc;

use imazon_alerts_models::DownloadUrls;

use crate::params::ParameterMap;
use crate::profile::GenerationProfile;
use crate::store::{TemplateName, TemplateStore};

/// Derives download URLs against one SQL API endpoint.
#[derive(Debug, Clone)]
pub struct DownloadLinks {
    api_url: String,
    store: Arc<TemplateStore>,
}

impl DownloadLinks {
    /// Links against `api_url` using templates from `store`.
    #[must_use]
    pub fn new(api_url: impl Into<String>, store: Arc<TemplateStore>) -> Self {
        Self {
            api_url: api_url.into(),
            store,
        }
    }

    /// One URL per format of the store's generation, or `None` if the
    /// template cannot be rendered.
    #[must_use]
    pub fn urls(&self, name: TemplateName, params: &ParameterMap) -> Option<DownloadUrls> {
        let sql = match self.download_sql(name, params) {
            Ok(sql) => sql,
            Err(e) => {
                log::error!("Failed to derive download links for '{name}': {e}");
                return None;
            }
        };

        let encoded = urlencoding::encode(&sql);
        let generation = self.store.generation();
        Some(
            generation
                .download_formats()
                .iter()
                .map(|format| {
                    (
                        *format,
                        format!("{}?q={encoded}&format={format}", self.api_url),
                    )
                })
                .collect(),
        )
    }

    fn download_sql(
        &self,
        name: TemplateName,
        params: &ParameterMap,
    ) -> Result<String, crate::QueryError> {
        let sql = self
            .store
            .get(name)?
            .render(&params.without_summary())?;
        let profile = GenerationProfile::for_generation(self.store.generation());
        if profile.rewrite_download_columns {
            Ok(with_geometry_columns(&sql))
        } else {
            Ok(sql)
        }
    }
}

/// Adds the alert geometry to the selected and grouped columns.
fn with_geometry_columns(sql: &str) -> String {
    sql.replacen("SELECT data_type,", "SELECT i.data_type, i.the_geom,", 1)
        .replacen("GROUP BY data_type", "GROUP BY data_type, i.the_geom", 1)
}
