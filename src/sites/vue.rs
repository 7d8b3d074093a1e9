//! Vue Cinemas quick-book widget (myvue.com)
//!
//! The quick-book bar exposes venue, film, date and time as dropdowns built
//! from the same `items-selector-content` component. Showtimes only appear
//! once a date is picked, so availability is discovered by sweeping dates.

use super::generic;
use crate::profile::{DateStage, DropdownStage, ProductStage, SiteProfile, SweepProfile, patterns};

const FILM_ITEMS: &str =
    "[data-test='quick-book-film-selector'] ul[class*='items-selector-content'] li[class*='items-selector-content__item']";
const DATE_ITEMS: &str =
    "[data-test='quick-book-date-selector'] ul[class*='items-selector-content'] li[class*='items-selector-content__item']";
const TIME_ITEMS: &str =
    "[data-test='quick-book-time-selector'] ul[class*='items-selector-content'] li[class*='items-selector-content__item']";

pub fn profile() -> SiteProfile {
    SiteProfile {
        name: "vue".to_string(),
        hosts: vec!["myvue.com".to_string()],
        consent: patterns(&[
            "button#onetrust-accept-btn-handler",
            "button:has-text('Accept All Cookies')",
        ]),
        venue: Some(DropdownStage {
            opener: patterns(&[
                "button[data-test='dropdown-opener'] span:has-text('VENUE')",
                "[data-test='quick-book-venue-selector'] button[data-test='dropdown-opener']",
            ]),
            items: patterns(&[
                "ul.venue-selector-dropdown-content li.dropdown-item",
                "[data-test='quick-book-venue-selector'] li[class*='items-selector-content__item']",
            ]),
            optional: false,
        }),
        product: Some(ProductStage {
            opener: patterns(&[
                "[data-test='quick-book-film-selector'] button[data-test='dropdown-opener']",
            ]),
            search_input: patterns(&[
                "[data-test='quick-book-dropdown-search-input']",
                "[data-test='quick-book-film-selector'] input",
            ]),
            items: patterns(&[FILM_ITEMS]),
            page_search: generic::page_search(),
            sidebar: Some(generic::sidebar()),
            generic_items: generic::title_links(),
        }),
        date: Some(DateStage {
            opener: patterns(&[
                "[data-test='quick-book-date-selector'] button[data-test='dropdown-opener']",
            ]),
            items: patterns(&[DATE_ITEMS]),
            sweep: Some(SweepProfile {
                time_opener: patterns(&[
                    "[data-test='quick-book-time-selector'] button[data-test='dropdown-opener']",
                ]),
                time_items: patterns(&[
                    TIME_ITEMS,
                    "[data-test='quick-book-time-selector'] li",
                ]),
                loading: patterns(&[
                    "[data-test='quick-book-time-selector'] [class*='loader']",
                    "[class*='spinner']",
                ]),
                showtime_response: Some("/showtimes".to_string()),
            }),
            optional: false,
        }),
        time: None,
        submit: Vec::new(),
        listings: generic::listings(),
        title_suffixes: ["Hindi", "Tamil", "Telugu", "Punjabi", "Malayalam"]
            .into_iter()
            .map(str::to_string)
            .collect(),
    }
}
