//! Catch-all profile built from class/attribute heuristics common to cinema booking pages

use crate::profile::{
    DateStage, DropdownStage, ListingProfile, Patterns, ProductStage, SidebarSearch, SiteProfile,
    patterns,
};

pub fn listings() -> ListingProfile {
    ListingProfile {
        container: patterns(&[
            "[data-test*='showtime']",
            "[class*='showtime']",
            "[class*='session']",
            "[class*='performance']",
            "[class*='ticket']",
        ]),
        title: patterns(&["[class*='title']", "h2", "h3", "h4"]),
        time: patterns(&["time", "[class*='time']"]),
        venue: patterns(&["[class*='venue']", "[class*='cinema']", "[class*='location']"]),
        date: patterns(&["[class*='date']", "[class*='day']"]),
        price: patterns(&["[class*='price']"]),
        affordance: patterns(&[
            "a:has-text('Book')",
            "button:has-text('Book')",
            "a:has-text('Buy')",
            "button:has-text('Buy')",
            "a:has-text('Tickets')",
            "[class*='available']:not([class*='unavailable'])",
        ]),
    }
}

pub fn page_search() -> Patterns {
    patterns(&[
        "input[type='search']",
        "input[name*='search']",
        "input[placeholder*='Search']",
        "input[placeholder*='search']",
    ])
}

pub fn sidebar() -> SidebarSearch {
    SidebarSearch {
        opener: patterns(&[
            "button[aria-label*='earch']",
            "[class*='search-toggle']",
            "[class*='search-trigger']",
        ]),
        input: patterns(&[
            "aside input",
            "[class*='sidebar'] input",
            "[class*='search-panel'] input",
        ]),
        items: patterns(&[
            "aside li",
            "aside a",
            "[class*='sidebar'] li",
            "[class*='search-panel'] li",
        ]),
    }
}

pub fn title_links() -> Patterns {
    patterns(&[
        "[class*='film-title']",
        "[class*='movie-title']",
        "a[href*='/film']",
        "a[href*='/movie']",
    ])
}

pub fn profile() -> SiteProfile {
    SiteProfile {
        name: "generic".to_string(),
        hosts: Vec::new(),
        consent: Vec::new(),
        venue: Some(DropdownStage {
            opener: patterns(&[
                "[data-test*='venue'] button",
                "[class*='venue-selector'] button",
                "[class*='cinema-selector'] button",
                "button:has-text('Venue')",
                "button:has-text('Cinema')",
            ]),
            items: patterns(&[
                "[data-test*='venue'] li",
                "[class*='venue'] li",
                "[class*='cinema'] li",
                "[role='listbox'] [role='option']",
            ]),
            optional: true,
        }),
        product: Some(ProductStage {
            opener: patterns(&[
                "[data-test*='film'] button",
                "[class*='film-selector'] button",
                "[class*='movie-selector'] button",
                "button:has-text('Film')",
                "button:has-text('Movie')",
            ]),
            search_input: patterns(&[
                "[data-test*='film'] input",
                "[class*='film-selector'] input",
                "[class*='movie-selector'] input",
            ]),
            items: patterns(&[
                "[data-test*='film'] li",
                "[class*='film-selector'] li",
                "[class*='movie-selector'] li",
                "[role='listbox'] [role='option']",
            ]),
            page_search: page_search(),
            sidebar: Some(sidebar()),
            generic_items: title_links(),
        }),
        date: Some(DateStage {
            opener: patterns(&[
                "[data-test*='date'] button",
                "[class*='date-selector'] button",
                "button:has-text('Date')",
            ]),
            items: patterns(&[
                "[data-test*='date'] li",
                "[class*='date-selector'] li",
                "[class*='date-picker'] button",
                "[role='tablist'] [role='tab']",
            ]),
            sweep: None,
            optional: true,
        }),
        time: Some(DropdownStage {
            opener: patterns(&[
                "[data-test*='time'] button",
                "[class*='time-selector'] button",
                "button:has-text('Time')",
            ]),
            items: patterns(&[
                "[data-test*='time'] li",
                "[class*='time-selector'] li",
                "[role='listbox'] [role='option']",
            ]),
            optional: true,
        }),
        submit: patterns(&[
            "button[type='submit']",
            "button:has-text('Search')",
            "button:has-text('Find')",
            "a:has-text('Search')",
            "button:has-text('Show times')",
        ]),
        listings: listings(),
        title_suffixes: Vec::new(),
    }
}
