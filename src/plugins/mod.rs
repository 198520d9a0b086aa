//! The plugins that ship with blazemark. A manifest in the plugins directory
//! selects one of them by name (see [`crate::plugin`]) and may override its
//! options.

use serde::de::DeserializeOwned;
use tracing::warn;
use url::Url;

use crate::config::SiteMetadata;
use crate::plugin::{LoadError, Plugin};

pub mod archives;
pub mod feed;
pub mod sitemap;
pub mod wordcount;

pub use archives::Archives;
pub use feed::Feed;
pub use sitemap::Sitemap;
pub use wordcount::WordCount;

/// Used for absolute links when the site has no valid `url`.
pub const FALLBACK_SITE_URL: &str = "http://example.com/";

/// Instantiates the built-in plugin called `name` with the manifest's
/// `options`. Absent options (`null`) select the plugin's defaults.
pub fn builtin(name: &str, options: serde_yaml::Value) -> Result<Box<dyn Plugin>, LoadError> {
    Ok(match name {
        wordcount::NAME => Box::new(WordCount::new(parse_options(options)?)),
        archives::NAME => Box::new(Archives::new(parse_options(options)?)),
        feed::NAME => Box::new(Feed::new(parse_options(options)?)),
        sitemap::NAME => Box::new(Sitemap::new(parse_options(options)?)),
        _ => return Err(LoadError::Unknown(name.to_owned())),
    })
}

fn parse_options<T: DeserializeOwned + Default>(options: serde_yaml::Value) -> Result<T, LoadError> {
    if options.is_null() {
        return Ok(T::default());
    }
    Ok(serde_yaml::from_value(options)?)
}

/// The site's base URL with a trailing slash, so that joining keeps any
/// sub-path (`https://example.org/blog/`).
pub(crate) fn base_url(site: &SiteMetadata) -> Url {
    let raw = if site.url.ends_with('/') {
        site.url.clone()
    } else {
        format!("{}/", site.url)
    };
    match Url::parse(&raw) {
        Ok(url) => url,
        Err(err) => {
            if !site.url.is_empty() {
                warn!(url = %site.url, error = %err, "invalid site url; using fallback");
            }
            Url::parse(FALLBACK_SITE_URL).expect("valid fallback url")
        }
    }
}

/// Resolves a site-relative `path` (e.g. `/hello/index.html`) against `base`.
pub(crate) fn absolute_url(base: &Url, path: &str) -> String {
    match base.join(path.trim_start_matches('/')) {
        Ok(url) => url.into(),
        Err(_) => format!("{}{}", base, path.trim_start_matches('/')),
    }
}
