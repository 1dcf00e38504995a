mod events;
mod status;
mod urls;

use events::events_route;
use status::status_route;
use urls::{create_url, delete_url, list_urls};

macros_utils::routes! {
    route list_urls,
    route create_url,
    route delete_url,
    route status_route,
    route events_route,
}
