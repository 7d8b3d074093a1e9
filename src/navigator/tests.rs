use chrono::{NaiveDate, NaiveTime};
use serde_json::json;

use super::*;
use crate::alert::Alert;
use crate::engine::check_as_of;
use crate::models::{BookingKind, Evidence, Outcome, Preferences};
use crate::page::fixture::FixturePage;
use crate::profile::{SidebarSearch, patterns};
use crate::selector::Role;

const URL: &str = "https://cinema.test/whats-on";

const PROFILE: &str = r#"{
    "name": "fixture",
    "hosts": ["cinema.test"],
    "venue": {"opener": ["button.venue-toggle"], "items": ["ul.venues li"]},
    "product": {
        "opener": ["button.film-toggle"],
        "search_input": ["input.film-search"],
        "items": ["ul.films li"],
        "sidebar": null
    },
    "date": {"opener": ["button.date-toggle"], "items": ["ul.dates li"], "sweep": null},
    "time": {"opener": ["button.time-toggle"], "items": ["ul.times li"]},
    "submit": ["button.search"],
    "listings": {
        "container": [".session"],
        "title": [".film"],
        "time": ["time"],
        "venue": [".where"],
        "price": [".price"],
        "affordance": ["a:has-text('Book')"]
    }
}"#;

const SWEEP_PROFILE: &str = r#"{
    "name": "fixture-sweep",
    "venue": null,
    "product": null,
    "date": {
        "opener": ["button.date-toggle"],
        "items": ["ul.dates li"],
        "sweep": {
            "time_items": ["ul.times li"],
            "loading": [".spinner"],
            "showtime_response": "/showtimes"
        }
    },
    "time": null,
    "listings": {
        "container": [".session"], "title": [".film"], "time": ["time"],
        "venue": [".where"], "affordance": ["a:has-text('Book')"]
    }
}"#;

fn profile(raw: &str) -> SiteProfile {
    serde_json::from_str(raw).unwrap()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, 8).unwrap()
}

fn request() -> BookingRequest {
    BookingRequest {
        kind: BookingKind::Movie,
        target_url: URL.to_string(),
        preferences: Preferences {
            product_title: "Dune: Part Two".to_string(),
            venue_name: "AMC Downtown".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 12, 12).unwrap(),
            time: NaiveTime::from_hms_opt(19, 0, 0),
        },
    }
}

/// Quick-book bar with every selector closed, plus whatever is open.
fn funnel(open: &str) -> String {
    format!(
        r#"<html><body>
             <nav class="quick-book">
               <button class="venue-toggle">Venue</button>
               <button class="film-toggle">Film</button>
               <button class="date-toggle">Date</button>
               <button class="time-toggle">Time</button>
               <button class="search">Search</button>
             </nav>
             {open}
           </body></html>"#
    )
}

fn list(class: &str, items: &[&str]) -> String {
    let items: String = items.iter().map(|i| format!("<li>{i}</li>")).collect();
    format!(r#"<ul class="{class}">{items}</ul>"#)
}

const FILMS: &[&str] = &["Wicked", "Dune: Part Two", "Dune: Part Two (Hindi)", "Gladiator II"];

fn film_picker(films: &[&str]) -> String {
    format!(r#"<input class="film-search">{}"#, list("films", films))
}

fn results() -> String {
    r#"<html><body><section class="results">
         <div class="session">
           <span class="film">Dune: Part Two</span><span class="where">AMC Downtown</span>
           <time>17:30</time><span class="price">£14.00</span><a href="/book/1">Book</a>
         </div>
         <div class="session">
           <span class="film">Dune: Part Two</span><span class="where">AMC Downtown</span>
           <time>19:00</time><span class="price">£14.00</span><a href="/book/2">Book</a>
         </div>
       </section></body></html>"#
        .to_string()
}

/// The full happy-path funnel, starting from `start`.
fn booking_site(start: &str, venues: &[&str], films: &'static [&'static str]) -> FixturePage {
    site(start, venues, films, true)
}

/// `narrow` makes the film search box filter the list by what was typed.
fn site(start: &str, venues: &[&str], films: &'static [&'static str], narrow: bool) -> FixturePage {
    let closed = funnel("");
    let mut page = FixturePage::new(URL, start)
        .on_click("button.venue-toggle", &funnel(&list("venues", venues)))
        .on_click("ul.venues li", &closed)
        .on_click("button.film-toggle", &funnel(&film_picker(films)));
    if narrow {
        page = page.on_fill("input.film-search", move |typed| {
            let typed = typed.to_lowercase();
            let narrowed: Vec<&str> = films
                .iter()
                .copied()
                .filter(|f| f.to_lowercase().contains(&typed))
                .collect();
            funnel(&film_picker(&narrowed))
        });
    }
    page.on_click("ul.films li", &closed)
        .on_click(
            "button.date-toggle",
            &funnel(&list("dates", &["Thu 11 Dec", "Fri 12 Dec", "Sat 13 Dec"])),
        )
        .on_click("ul.dates li", &closed)
        .on_click("button.time-toggle", &funnel(&list("times", &["17:30", "19:00", "21:45"])))
        .on_click("ul.times li", &closed)
        .on_click("button.search", &results())
}

#[tokio::test]
async fn full_funnel_finds_a_bookable_listing() {
    let page = booking_site(&funnel(""), &["AMC Uptown", "AMC Downtown"], FILMS);
    let profile = profile(PROFILE);
    let settings = EngineSettings::default();
    let request = request();

    let outcome = check_as_of(&page, &profile, &settings, &request, today()).await;

    let Outcome::Found(result) = outcome else {
        panic!("expected Found, got {}", outcome.label());
    };
    let Some(Evidence::Listing(listing)) = &result.evidence else {
        panic!("expected listing evidence");
    };
    assert_eq!(listing.time, "19:00");
    assert_eq!(listing.price.as_deref(), Some("£14.00"));
    assert_eq!(result.url, URL);

    assert_eq!(
        page.clicked(),
        vec!["Venue", "AMC Downtown", "Film", "Dune: Part Two", "Date", "Fri 12 Dec", "Time", "19:00", "Search"]
    );
    assert_eq!(page.filled(), vec![(String::new(), "Dune: Part Two".to_string())]);

    let alert = Alert::from_result(&request, &result).unwrap();
    for expected in ["Dune: Part Two", "AMC Downtown", "2025-12-12", "19:00"] {
        assert!(alert.body.contains(expected), "missing {expected:?}");
    }
}

#[tokio::test]
async fn states_advance_in_funnel_order() {
    let page = booking_site(&funnel(""), &["AMC Downtown"], FILMS);
    let profile = profile(PROFILE);
    let settings = EngineSettings::default();
    let mut navigator = Navigator::new(&page, &profile, &settings).with_today(today());

    let output = navigator.run(&request()).await.unwrap();

    assert_eq!(output, FunnelOutput::Submitted);
    assert_eq!(
        navigator.history(),
        &[
            NavigationState::Init,
            NavigationState::ConsentResolved,
            NavigationState::VenueSelected,
            NavigationState::ProductSelected,
            NavigationState::DateSelected,
            NavigationState::TimeSelected,
            NavigationState::Submitted,
        ]
    );
    navigator.mark_scanned();
    assert_eq!(navigator.state(), &NavigationState::Scanned);
    assert!(navigator.state().is_terminal());
}

#[tokio::test]
async fn missing_product_reports_the_titles_present() {
    const OTHERS: &[&str] = &["Wicked", "Gladiator II"];
    let page = site(&funnel(""), &["AMC Downtown"], OTHERS, false);
    let profile = profile(PROFILE);
    let settings = EngineSettings::default();
    let mut navigator = Navigator::new(&page, &profile, &settings).with_today(today());

    let err = navigator.run(&request()).await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Product));
    match err.root() {
        EngineError::ElementNotFound { role, candidates, seen } => {
            assert_eq!(*role, Role::ProductItem);
            assert_eq!(candidates, &vec!["ul.films li".to_string()]);
            assert_eq!(seen, &vec!["Wicked".to_string(), "Gladiator II".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        navigator.state(),
        NavigationState::Failed { stage: Stage::Product, .. }
    ));
    assert!(!navigator.history().contains(&NavigationState::ProductSelected));
}

#[tokio::test]
async fn closed_venue_still_matches_by_containment() {
    // Containment cannot tell a closed branch from an open one; this pins the behaviour.
    let page = booking_site(&funnel(""), &["AMC Downtown (Closed)"], FILMS);
    let profile = profile(PROFILE);
    let settings = EngineSettings::default();
    let mut navigator = Navigator::new(&page, &profile, &settings).with_today(today());

    navigator.run(&request()).await.unwrap();

    assert_eq!(page.clicked()[1], "AMC Downtown (Closed)");
}

#[tokio::test]
async fn date_sweep_keeps_only_dates_with_times() {
    let dates = ["Mon 8 Dec", "Tue 9 Dec", "Wed 10 Dec", "Thu 11 Dec", "Fri 12 Dec"];
    let start = funnel("");
    let open = funnel(&list("dates", &dates));
    let showing = |times: &[&str]| funnel(&list("times", times));

    let page = FixturePage::new(URL, &start)
        .on_click("button.date-toggle", &open)
        .on_click_text("ul.dates li", "Mon 8 Dec", &showing(&[]))
        .on_click_text("ul.dates li", "Tue 9 Dec", &showing(&["19:00"]))
        .on_click_text("ul.dates li", "Wed 10 Dec", &showing(&[]))
        .on_click_text("ul.dates li", "Thu 11 Dec", &showing(&["14:00", "20:15"]))
        .on_click_respond(
            "ul.dates li",
            "Thu 11 Dec",
            json!({"sessions": [{"start": "2025-12-11T20:15:00"}]}),
        )
        .on_click_text("ul.dates li", "Fri 12 Dec", &showing(&[]));
    let profile = profile(SWEEP_PROFILE);
    let settings = EngineSettings::default();

    let outcome = check_as_of(&page, &profile, &settings, &request(), today()).await;

    let Outcome::Found(result) = outcome else {
        panic!("expected Found, got {}", outcome.label());
    };
    let Some(Evidence::Schedule(schedule)) = result.evidence else {
        panic!("expected schedule evidence");
    };
    assert_eq!(
        schedule,
        vec![
            DateShowtimes {
                date: "Tue 9 Dec".to_string(),
                times: vec!["19:00".to_string()],
            },
            DateShowtimes {
                date: "Thu 11 Dec".to_string(),
                times: vec!["20:15".to_string(), "14:00".to_string()],
            },
        ]
    );
    assert_eq!(page.clicked().iter().filter(|c| *c == "Date").count(), 5);
}

#[tokio::test]
async fn sweep_with_no_times_anywhere_is_not_found() {
    let page = FixturePage::new(URL, &funnel(""))
        .on_click("button.date-toggle", &funnel(&list("dates", &["Mon 8 Dec", "Tue 9 Dec"])))
        .on_click("ul.dates li", &funnel(""));
    let profile = profile(SWEEP_PROFILE);
    let settings = EngineSettings::default();

    let outcome = check_as_of(&page, &profile, &settings, &request(), today()).await;

    assert!(matches!(outcome, Outcome::NotFound(_)));
}

#[tokio::test]
async fn consent_preferences_panel_is_saved_before_the_funnel() {
    let banner = funnel(
        r#"<div class="consent-banner"><button class="prefs">Manage preferences</button></div>"#,
    );
    let panel = funnel(
        r#"<div class="consent-banner"><div class="preference-center">
             <button class="save">Save choices</button>
           </div></div>"#,
    );
    let page = booking_site(&banner, &["AMC Downtown"], FILMS)
        .on_click("button.prefs", &panel)
        .on_click("button.save", &funnel(""));
    let profile = profile(PROFILE);
    let settings = EngineSettings::default();

    let outcome = check_as_of(&page, &profile, &settings, &request(), today()).await;

    assert!(matches!(outcome, Outcome::Found(_)), "got {}", outcome.label());
    assert_eq!(&page.clicked()[..3], &["Manage preferences", "Save choices", "Venue"]);
}

#[tokio::test]
async fn disabled_time_selector_fails_after_one_grace_period() {
    let closed = funnel("").replace(
        r#"<button class="time-toggle">Time</button>"#,
        r#"<button class="time-toggle" disabled>Time</button>"#,
    );
    let page = FixturePage::new(URL, &closed)
        .on_click("button.venue-toggle", &funnel(&list("venues", &["AMC Downtown"])))
        .on_click("ul.venues li", &closed)
        .on_click("button.film-toggle", &funnel(&list("films", &["Dune: Part Two"])))
        .on_click("ul.films li", &closed)
        .on_click("button.date-toggle", &funnel(&list("dates", &["Fri 12 Dec"])))
        .on_click("ul.dates li", &closed);
    let profile = profile(PROFILE);
    let settings = EngineSettings::default();
    let mut navigator = Navigator::new(&page, &profile, &settings).with_today(today());

    let err = navigator.run(&request()).await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Time));
    assert!(matches!(err.root(), EngineError::ClickFailed { .. }));
    assert!(!page.clicked().contains(&"Time".to_string()));
}

#[tokio::test]
async fn stages_missing_from_the_profile_are_skipped() {
    let mut bare = profile(PROFILE);
    bare.venue = None;
    bare.product = None;
    bare.date = None;
    bare.time = None;
    let page = FixturePage::new(URL, &funnel("")).on_click("button.search", &results());
    let settings = EngineSettings::default();

    let outcome = check_as_of(&page, &bare, &settings, &request(), today()).await;

    assert!(matches!(outcome, Outcome::Found(_)));
    assert_eq!(page.clicked(), vec!["Search"]);
}

#[tokio::test]
async fn relative_date_labels_are_understood() {
    let page = FixturePage::new(URL, &funnel(""))
        .on_click("button.date-toggle", &funnel(&list("dates", &["Today", "Tomorrow"])))
        .on_click("ul.dates li", &funnel(""));
    let mut profile = profile(PROFILE);
    profile.venue = None;
    profile.product = None;
    profile.time = None;
    profile.submit = Vec::new();
    let settings = EngineSettings::default();
    let mut navigator = Navigator::new(&page, &profile, &settings)
        .with_today(NaiveDate::from_ymd_opt(2025, 12, 11).unwrap());

    navigator.run(&request()).await.unwrap();

    assert_eq!(page.clicked(), vec!["Date", "Tomorrow"]);
}

/// `PROFILE` reduced to its product stage, with no submit button.
fn product_only() -> SiteProfile {
    let mut profile = profile(PROFILE);
    profile.venue = None;
    profile.date = None;
    profile.time = None;
    profile.submit = Vec::new();
    profile
}

fn bare() -> SiteProfile {
    let mut profile = product_only();
    profile.product = None;
    profile
}

#[tokio::test]
async fn busy_network_falls_back_to_dom_ready() {
    let page = FixturePage::new("about:blank", &funnel("")).network_never_idle();
    let profile = bare();
    let settings = EngineSettings::default();
    let mut navigator = Navigator::new(&page, &profile, &settings).with_today(today());

    navigator.run(&request()).await.unwrap();

    assert_eq!(page.url(), URL);
    assert!(navigator.history().contains(&NavigationState::ConsentResolved));
}

#[tokio::test]
async fn page_that_never_settles_fails_at_load() {
    let page = FixturePage::new(URL, &funnel(""))
        .network_never_idle()
        .dom_never_ready();
    let profile = bare();
    let settings = EngineSettings::default();
    let mut navigator = Navigator::new(&page, &profile, &settings).with_today(today());

    let err = navigator.run(&request()).await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Load));
    match err.root() {
        EngineError::NavigationTimeout { what, timeout } => {
            assert_eq!(what, "DOM ready");
            assert_eq!(*timeout, settings.timeouts().dom_ready);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!navigator.history().contains(&NavigationState::ConsentResolved));
    assert!(page.clicked().is_empty());
}

#[tokio::test]
async fn film_is_found_through_the_page_search() {
    let header = |links: &str| {
        format!(r#"<html><body><header><input class="site-search"></header>{links}</body></html>"#)
    };
    let page = FixturePage::new(URL, &header(""))
        .on_fill("input.site-search", move |_| {
            header(
                r#"<a class="film-link" href="/films/wicked">Wicked</a>
                   <a class="film-link" href="/films/dune">Dune: Part Two</a>"#,
            )
        })
        .on_click("a.film-link", &header(""));
    let mut profile = product_only();
    if let Some(product) = profile.product.as_mut() {
        product.page_search = patterns(&["input.site-search"]);
        product.generic_items = patterns(&["a.film-link"]);
    }
    let settings = EngineSettings::default();
    let mut navigator = Navigator::new(&page, &profile, &settings).with_today(today());

    navigator.run(&request()).await.unwrap();

    assert_eq!(page.filled(), vec![(String::new(), "Dune: Part Two".to_string())]);
    assert_eq!(page.clicked(), vec!["Dune: Part Two"]);
    assert!(navigator.history().contains(&NavigationState::ProductSelected));
}

#[tokio::test]
async fn film_is_found_through_the_sidebar() {
    let closed = r#"<html><body><button class="search-toggle">Search films</button></body></html>"#;
    let panel = format!(
        r#"<html><body><aside><input class="q">{}</aside></body></html>"#,
        list("results", &["Wicked", "Dune: Part Two"])
    );
    let page = FixturePage::new(URL, closed)
        .on_click("button.search-toggle", &panel)
        .on_click("aside li", closed);
    let mut profile = product_only();
    if let Some(product) = profile.product.as_mut() {
        product.sidebar = Some(SidebarSearch {
            opener: patterns(&["button.search-toggle"]),
            input: patterns(&["aside input"]),
            items: patterns(&["aside li"]),
        });
    }
    let settings = EngineSettings::default();
    let mut navigator = Navigator::new(&page, &profile, &settings).with_today(today());

    navigator.run(&request()).await.unwrap();

    assert_eq!(page.clicked(), vec!["Search films", "Dune: Part Two"]);
    assert_eq!(page.filled().len(), 1);
    assert!(navigator.history().contains(&NavigationState::ProductSelected));
}

#[tokio::test]
async fn film_is_found_in_a_plain_title_list() {
    let page = FixturePage::new(
        URL,
        r#"<html><body><nav>
             <a class="film-link" href="/films/wicked">Wicked</a>
             <a class="film-link" href="/films/dune">Dune: Part Two</a>
           </nav></body></html>"#,
    );
    let mut profile = product_only();
    if let Some(product) = profile.product.as_mut() {
        product.generic_items = patterns(&["a.film-link"]);
    }
    let settings = EngineSettings::default();
    let mut navigator = Navigator::new(&page, &profile, &settings).with_today(today());

    navigator.run(&request()).await.unwrap();

    assert!(page.filled().is_empty());
    assert_eq!(page.clicked(), vec!["Dune: Part Two"]);
}

#[test]
fn failed_state_renders_its_stage() {
    let state = NavigationState::Failed {
        stage: Stage::Venue,
        reason: "no venue item found".to_string(),
    };
    assert_eq!(state.to_string(), "Failed(venue)");
    assert_eq!(NavigationState::DateSelected.to_string(), "DateSelected");
}
