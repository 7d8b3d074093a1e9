//! Built-in site profiles

pub mod generic;
pub mod vue;

#[cfg(test)]
use crate::profile::SiteProfile;
#[cfg(test)]
use crate::selector::SelectorPattern;

/// Every selector pattern a profile references, for validation.
#[cfg(test)]
pub fn all_patterns(profile: &SiteProfile) -> Vec<&SelectorPattern> {
    let mut out: Vec<&SelectorPattern> = Vec::new();
    out.extend(&profile.consent);
    if let Some(venue) = &profile.venue {
        out.extend(venue.opener.iter().chain(&venue.items));
    }
    if let Some(product) = &profile.product {
        out.extend(
            product
                .opener
                .iter()
                .chain(&product.search_input)
                .chain(&product.items)
                .chain(&product.page_search)
                .chain(&product.generic_items),
        );
        if let Some(sidebar) = &product.sidebar {
            out.extend(sidebar.opener.iter().chain(&sidebar.input).chain(&sidebar.items));
        }
    }
    if let Some(date) = &profile.date {
        out.extend(date.opener.iter().chain(&date.items));
        if let Some(sweep) = &date.sweep {
            out.extend(
                sweep
                    .time_opener
                    .iter()
                    .chain(&sweep.time_items)
                    .chain(&sweep.loading),
            );
        }
    }
    if let Some(time) = &profile.time {
        out.extend(time.opener.iter().chain(&time.items));
    }
    out.extend(&profile.submit);
    let listings = &profile.listings;
    out.extend(
        listings
            .container
            .iter()
            .chain(&listings.title)
            .chain(&listings.time)
            .chain(&listings.venue)
            .chain(&listings.date)
            .chain(&listings.price)
            .chain(&listings.affordance),
    );
    out
}
