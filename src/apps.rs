//! App id resolution by bundle identifier

use crate::client::AscClient;
use crate::error::{Error, Result};
use serde::Deserialize;
use url::form_urlencoded;

#[derive(Debug, Default, Deserialize)]
struct AppsResponse {
    #[serde(default)]
    data: Vec<AppResource>,
}

#[derive(Debug, Deserialize)]
struct AppResource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    attributes: Option<AppAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppAttributes {
    #[serde(default)]
    bundle_id: Option<String>,
}

/// Look up the App Store Connect app id for `bundle_id`
///
/// The filter is server-side, but entries are re-checked for an exact bundle
/// id match before counting.
///
/// # Errors
///
/// - [`Error::AppNotFound`] when nothing matches
/// - [`Error::AppAmbiguous`] when more than one app matches
pub async fn lookup_app_id(client: &AscClient, bundle_id: &str) -> Result<String> {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("filter[bundleId]", bundle_id)
        .finish();

    // Docs: https://developer.apple.com/documentation/appstoreconnectapi/apps
    let response: AppsResponse = client
        .get_json(
            &format!("/apps?{}", query),
            "Failed to locate App Store Connect application.",
        )
        .await?;

    let ids: Vec<String> = response
        .data
        .into_iter()
        .filter(|app| {
            app.attributes
                .as_ref()
                .and_then(|a| a.bundle_id.as_deref())
                == Some(bundle_id)
        })
        .filter_map(|app| app.id.filter(|id| !id.is_empty()))
        .collect();

    match ids.len() {
        0 => Err(Error::AppNotFound {
            bundle_id: bundle_id.to_string(),
        }),
        1 => Ok(ids.into_iter().next().unwrap_or_default()),
        count => Err(Error::AppAmbiguous {
            bundle_id: bundle_id.to_string(),
            count,
        }),
    }
}
