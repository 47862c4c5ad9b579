mod browse;
mod catalog;
mod components;
mod engine;
mod handlers;
mod history;
mod history_view;
mod locator;
mod logging;
mod media;
mod page;
mod player_handlers;
mod player_view;
mod resolver;
mod router;
mod session;
mod settings;
mod slug;
mod title_view;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use iced::widget::container;
use iced::{Element, Font, Length, Size, Subscription, Task, Theme};
use tracing::info;

use catalog::{Catalog, CatalogClient};
use engine::{EngineFactory, FfmpegEngineFactory};
use history::{HistoryEntry, HistoryStore};
use media::{ImageCache, Listing, LoadingState, Message, Taxonomy, BACKGROUND_BLACK};
use page::TitlePage;
use router::{Route, Router};
use session::StreamingSession;
use settings::AppSettings;

pub type Session = StreamingSession<Box<dyn EngineFactory>>;

pub struct Phimx {
    pub settings: AppSettings,
    pub catalog: Arc<dyn Catalog>,
    pub router: Router,
    pub next_generation: u64,
    pub title_page: Option<TitlePage>,
    pub session: Session,
    pub history: HistoryStore,
    pub history_entries: Vec<HistoryEntry>,
    pub listing_generation: u64,
    pub listing_state: LoadingState,
    pub listing: Listing,
    pub categories: Vec<Taxonomy>,
    pub countries: Vec<Taxonomy>,
    pub search_query: String,
    pub image_cache: ImageCache,
    pub player_frame: Option<iced::widget::image::Handle>,
    pub player_error: Option<String>,
    pub status_message: Option<String>,
}

impl Phimx {
    pub fn with_parts(
        settings: AppSettings,
        catalog: Arc<dyn Catalog>,
        factory: Box<dyn EngineFactory>,
        history: HistoryStore,
    ) -> Self {
        let session = StreamingSession::new(factory, settings.checkpoint_interval())
            .with_proxy(settings.proxy_base.clone())
            .with_autoplay(settings.autoplay);
        let history_entries = history.get_all();
        Self {
            settings,
            catalog,
            router: Router::default(),
            next_generation: 0,
            title_page: None,
            session,
            history,
            history_entries,
            listing_generation: 0,
            listing_state: LoadingState::Idle,
            listing: Listing::default(),
            categories: Vec::new(),
            countries: Vec::new(),
            search_query: String::new(),
            image_cache: ImageCache::default(),
            player_frame: None,
            player_error: None,
            status_message: None,
        }
    }

    /// Replaces the initial address; the first `start` loads it.
    pub fn starting_at(mut self, route: Route) -> Self {
        self.router = Router::new(route);
        self
    }

    /// Loads the taxonomies and whatever the current address points at.
    pub fn start(&mut self) -> Task<Message> {
        Task::batch([handlers::load_taxonomies(self), handlers::apply_route(self)])
    }

    fn new() -> (Self, Task<Message>) {
        let settings = AppSettings::load_or_default();
        let start = launch_route(std::env::args().skip(1));
        info!(api = %settings.api_base_url, route = %start, "starting phimx");

        let catalog: Arc<dyn Catalog> = Arc::new(CatalogClient::from_settings(&settings));
        let history = HistoryStore::open_default(settings.history_limit);
        let mut app = Self::with_parts(
            settings,
            catalog,
            Box::new(FfmpegEngineFactory::default()),
            history,
        )
        .starting_at(start);
        app.image_cache = ImageCache::new();

        let startup = app.start();
        (app, startup)
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        handlers::handle_message(self, message)
    }

    fn view(&self) -> Element<'_, Message> {
        let body = match self.router.current() {
            Route::Title(_) => self.view_title_page(),
            Route::History => self.view_history(),
            Route::Listing(query) => self.view_listing(query),
            Route::Search { keyword, page } => self.view_search(keyword, *page),
        };

        container(iced::widget::column![self.view_header(), body])
            .width(Length::Fill)
            .height(Length::Fill)
            .style(|_theme| container::Style {
                background: Some(iced::Background::Color(BACKGROUND_BLACK)),
                ..Default::default()
            })
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }

    fn subscription(&self) -> Subscription<Message> {
        if self.session.has_engine() {
            iced::time::every(std::time::Duration::from_millis(16)).map(|_| Message::PlayerFrameTick)
        } else {
            Subscription::none()
        }
    }
}

/// The address passed on the command line, e.g. `phimx /title/<id>?<server>&<episode>`.
fn launch_route(mut args: impl Iterator<Item = String>) -> Route {
    args.next()
        .map(|address| Route::parse(&address))
        .unwrap_or_default()
}

fn main() -> iced::Result {
    logging::init_logging();

    iced::application(Phimx::new, Phimx::update, Phimx::view)
        .title("Phimx")
        .theme(Phimx::theme)
        .window_size(Size::new(1280.0, 800.0))
        .font(iced_fonts::BOOTSTRAP_FONT_BYTES)
        .default_font(Font::DEFAULT)
        .subscription(Phimx::subscription)
        .run()
}
