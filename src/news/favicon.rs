use url::Url;

use crate::storage::Feed;

/// Hosts whose favicon does not live at the conventional `/favicon.ico`
/// path. Site-specific configuration data, not behavior: extend the table
/// when a publisher moves its icon.
const FAVICON_OVERRIDES: &[(&str, &str)] = &[
    (
        "www.sikkom.nl",
        "https://www.sikkom.nl/wp-content/themes/sikkom-v3/img/favicon.ico",
    ),
    ("www.gic.nl", "https://www.gic.nl/img/favicon.ico"),
    (
        "www.rtvnoord.nl",
        "https://www.rtvnoord.nl/Content/Images/noord/favicon.ico",
    ),
    (
        "www.filtergroningen.nl",
        "https://i1.wp.com/www.filtergroningen.nl/wp-content/uploads/2017/03/favicon.png?fit=32%2C32&#038;ssl=1",
    ),
    (
        "www.tivolivredenburg.nl",
        "https://www.tivolivredenburg.nl/wp-content/themes/tivolivredenburg/favicon.ico",
    ),
    (
        "www.vera-groningen.nl",
        "https://www.vera-groningen.nl/vera/assets/img/favicon.png",
    ),
    (
        "www.desmaakvanstad.nl",
        "https://www.desmaakvanstad.nl/wp-content/uploads/2017/08/cropped-FAVICON-1.jpg",
    ),
];

fn override_for(host: &str) -> Option<&'static str> {
    FAVICON_OVERRIDES
        .iter()
        .find(|(h, _)| *h == host)
        .map(|(_, url)| *url)
}

fn url_host(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
}

/// Resolves the display icon for a story link.
///
/// A link on the feed's own host uses the feed's advertised image when it
/// has one, else the conventional `/favicon.ico`. Links pointing elsewhere
/// (aggregated feeds) consult the override table before falling back to the
/// convention. A link with no parseable host is treated as the feed's own.
pub fn favicon_for_item(item_link: &str, feed: &Feed) -> String {
    let feed_host = url_host(&feed.url);
    let item_host = url_host(item_link);

    match (item_host, feed_host) {
        (Some(item), Some(feed_host)) if item != feed_host => override_for(&item)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("https://{}/favicon.ico", item)),
        (_, feed_host) => feed
            .image_url
            .clone()
            .unwrap_or_else(|| format!("https://{}/favicon.ico", feed_host.unwrap_or_default())),
    }
}
