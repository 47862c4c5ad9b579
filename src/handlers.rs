use iced::Task;
use tracing::{info, warn};

use crate::catalog::fetch_image_bytes;
use crate::history::HistoryError;
use crate::media::{
    Listing, ListingKind, ListingQuery, LoadingState, Message, Taxonomy, TitleSummary,
};
use crate::player_handlers;
use crate::router::Route;
use crate::Phimx;

pub fn handle_message(app: &mut Phimx, message: Message) -> Task<Message> {
    match message {
        Message::Navigate(route) => navigate(app, route),
        Message::Back => {
            if app.router.back().is_none() {
                return Task::none();
            }
            apply_route(app)
        }
        Message::Forward => {
            if app.router.forward().is_none() {
                return Task::none();
            }
            apply_route(app)
        }
        Message::SearchQueryChanged(query) => {
            app.search_query = query;
            Task::none()
        }
        Message::SearchSubmit => handle_search_submit(app),
        Message::PickCategory(category) => navigate(
            app,
            Route::Listing(ListingQuery::new(ListingKind::Category, category.slug, 1)),
        ),
        Message::PickCountry(country) => navigate(
            app,
            Route::Listing(ListingQuery::new(ListingKind::Country, country.slug, 1)),
        ),
        Message::PickYear(year) => navigate(
            app,
            Route::Listing(ListingQuery::new(ListingKind::Year, year.to_string(), 1)),
        ),
        Message::PickType(slug) => navigate(
            app,
            Route::Listing(ListingQuery::new(ListingKind::Type, slug, 1)),
        ),
        Message::CategoriesLoaded(result) => {
            handle_taxonomy_loaded(&mut app.categories, "categories", result);
            Task::none()
        }
        Message::CountriesLoaded(result) => {
            handle_taxonomy_loaded(&mut app.countries, "countries", result);
            Task::none()
        }
        Message::ListingLoaded(generation, result) => {
            handle_listing_loaded(app, generation, result)
        }
        Message::TitleLoaded(generation, result) => {
            player_handlers::handle_title_loaded(app, generation, *result)
        }
        Message::RetryTitle => player_handlers::handle_retry_title(app),
        Message::SelectServer(index) => player_handlers::handle_select_server(app, index),
        Message::SelectEpisode(server, episode) => {
            player_handlers::handle_select_episode(app, server, episode)
        }
        Message::ContinueWatching(locator) => navigate(app, Route::Title(locator)),
        Message::PlayerFrameTick => player_handlers::handle_player_tick(app),
        Message::PlayerTogglePlay => {
            app.session.toggle_pause();
            Task::none()
        }
        Message::PlayerSeek(position) => {
            app.session.seek(position);
            Task::none()
        }
        Message::PlayerSeekRelative(delta) => {
            app.session.seek_relative(delta);
            Task::none()
        }
        Message::PlayerSetVolume(volume) => {
            app.session.set_volume(volume);
            Task::none()
        }
        Message::PlayerToggleMute => {
            app.session.toggle_mute();
            Task::none()
        }
        Message::PlayerClose => player_handlers::handle_player_close(app),
        Message::HistoryRemove(title_id, episode_label) => {
            let result = app.history.remove(&title_id, &episode_label);
            after_history_write(app, result);
            Task::none()
        }
        Message::HistoryClear => {
            let result = app.history.clear();
            after_history_write(app, result);
            Task::none()
        }
        Message::LoadImage(url) => handle_load_image(app, url),
        Message::ImageLoaded(url, result) => {
            match result {
                Ok(handle) => app.image_cache.insert(url, handle),
                Err(e) => {
                    warn!(%url, error = %e, "image failed to load");
                    app.image_cache.fail(&url);
                }
            }
            Task::none()
        }
    }
}

/// Pushes a route and applies it. Navigating to the current route does nothing.
pub fn navigate(app: &mut Phimx, route: Route) -> Task<Message> {
    if !app.router.push(route) {
        return Task::none();
    }
    apply_route(app)
}

/// Brings the application state in line with the router's current route.
pub fn apply_route(app: &mut Phimx) -> Task<Message> {
    info!(route = %app.router.current(), "navigating");
    app.status_message = None;

    let route = match app.router.current().clone() {
        Route::Title(locator) => return player_handlers::enter_title(app, locator),
        other => other,
    };
    player_handlers::leave_title(app);

    match route {
        Route::Listing(query) => load_listing(app, query),
        Route::Search { keyword, page } => {
            app.search_query = keyword.clone();
            load_search(app, keyword, page)
        }
        Route::History => {
            app.history_entries = app.history.get_all();
            load_history_images(app)
        }
        Route::Title(_) => Task::none(),
    }
}

pub fn load_taxonomies(app: &Phimx) -> Task<Message> {
    let categories = app.catalog.clone();
    let countries = app.catalog.clone();
    Task::batch([
        Task::perform(
            async move { categories.fetch_categories().await },
            Message::CategoriesLoaded,
        ),
        Task::perform(
            async move { countries.fetch_countries().await },
            Message::CountriesLoaded,
        ),
    ])
}

fn handle_taxonomy_loaded(
    target: &mut Vec<Taxonomy>,
    what: &str,
    result: Result<Vec<Taxonomy>, crate::catalog::CatalogError>,
) {
    match result {
        Ok(items) => *target = items,
        Err(e) => warn!(error = %e, "failed to load {}", what),
    }
}

fn begin_listing(app: &mut Phimx) -> u64 {
    app.listing_generation += 1;
    app.listing_state = LoadingState::Loading;
    app.listing = Listing::default();
    app.listing_generation
}

fn load_listing(app: &mut Phimx, query: ListingQuery) -> Task<Message> {
    let generation = begin_listing(app);
    let catalog = app.catalog.clone();
    Task::perform(
        async move { catalog.fetch_listing(&query).await },
        move |result| Message::ListingLoaded(generation, result),
    )
}

fn load_search(app: &mut Phimx, keyword: String, page: u32) -> Task<Message> {
    let generation = begin_listing(app);
    if keyword.trim().is_empty() {
        app.listing_state = LoadingState::Idle;
        return Task::none();
    }
    let catalog = app.catalog.clone();
    Task::perform(
        async move { catalog.search(&keyword, page).await },
        move |result| Message::ListingLoaded(generation, result),
    )
}

fn handle_search_submit(app: &mut Phimx) -> Task<Message> {
    let keyword = app.search_query.trim().to_string();
    if keyword.is_empty() {
        return Task::none();
    }
    navigate(app, Route::Search { keyword, page: 1 })
}

fn handle_listing_loaded(
    app: &mut Phimx,
    generation: u64,
    result: Result<Listing, crate::catalog::CatalogError>,
) -> Task<Message> {
    if generation != app.listing_generation {
        return Task::none();
    }
    match result {
        Ok(listing) => {
            app.listing_state = LoadingState::Idle;
            let images = load_poster_images(app, &listing.items);
            app.listing = listing;
            images
        }
        Err(e) => {
            warn!(error = %e, "listing fetch failed");
            app.listing_state = LoadingState::Error(e.to_string());
            Task::none()
        }
    }
}

fn request_image(app: &Phimx, url: &str) -> Option<Task<Message>> {
    if !app.image_cache.wants(url) {
        return None;
    }
    Some(Task::done(Message::LoadImage(url.to_string())))
}

pub fn load_poster_images(app: &Phimx, items: &[TitleSummary]) -> Task<Message> {
    Task::batch(
        items
            .iter()
            .filter_map(|item| item.thumb_url.as_ref().or(item.poster_url.as_ref()))
            .filter_map(|url| request_image(app, url)),
    )
}

fn load_history_images(app: &Phimx) -> Task<Message> {
    Task::batch(
        app.history_entries
            .iter()
            .filter_map(|entry| entry.poster_ref.as_deref())
            .map(|poster| crate::catalog::image_url(&app.settings.image_base_url, poster))
            .filter_map(|url| request_image(app, &url)),
    )
}

pub fn load_image_url(app: &Phimx, url: &str) -> Task<Message> {
    request_image(app, url).unwrap_or_else(Task::none)
}

fn handle_load_image(app: &mut Phimx, url: String) -> Task<Message> {
    if !app.image_cache.wants(&url) {
        return Task::none();
    }
    app.image_cache.mark_pending(url.clone());
    let image_url = url.clone();
    let cache_path = app.image_cache.get_cache_path(&url);

    Task::perform(
        async move {
            if let Some(ref path) = cache_path {
                if let Ok(bytes) = tokio::fs::read(path).await {
                    return (image_url, Ok(bytes), cache_path, true);
                }
            }
            let bytes = fetch_image_bytes(image_url.clone()).await;
            (image_url, bytes, cache_path, false)
        },
        |(url, result, cache_path, from_cache)| match result {
            Ok(bytes) => {
                if !from_cache {
                    if let Some(path) = cache_path {
                        let bytes_clone = bytes.clone();
                        std::thread::spawn(move || {
                            let _ = std::fs::write(path, &bytes_clone);
                        });
                    }
                }
                Message::ImageLoaded(url, Ok(iced::widget::image::Handle::from_bytes(bytes)))
            }
            Err(error) => Message::ImageLoaded(url, Err(error)),
        },
    )
}

/// Refreshes the history snapshot after a write, surfacing failures.
pub fn after_history_write(app: &mut Phimx, result: Result<(), HistoryError>) {
    if let Err(e) = result {
        warn!(error = %e, "failed to write watch history");
        app.status_message = Some(format!("Could not save watch history: {}", e));
    }
    app.history_entries = app.history.get_all();
}
