use ratatui::widgets::ListState;

use livescroll::{FeedSnapshot, FeedStatus, Item, SortType};

use crate::driver::Command;

/// Rows from the end of the loaded window at which the next page is asked
/// for.
const LOAD_AHEAD: usize = 5;

pub struct App {
    /// Latest snapshot of the timeline; `None` until the engine reports.
    snapshot: Option<FeedSnapshot>,
    /// List selection state for scrolling.
    pub list_state: ListState,
    /// Whether the user has requested to quit.
    pub quit: bool,
    /// Status line text.
    pub status: String,
    pub sort: SortType,
    /// Page number a load-more was last requested at.
    requested_at_page: Option<usize>,
    /// Commands waiting to be sent to the engine.
    outbox: Vec<Command>,
}

impl App {
    pub fn new(sort: SortType) -> Self {
        Self {
            snapshot: None,
            list_state: ListState::default(),
            quit: false,
            status: "Starting…".into(),
            sort,
            requested_at_page: None,
            outbox: Vec::new(),
        }
    }

    pub fn items(&self) -> &[Item] {
        match &self.snapshot {
            Some(snapshot) => &snapshot.items,
            None => &[],
        }
    }

    pub fn buffered(&self) -> usize {
        self.snapshot.as_ref().map_or(0, |s| s.buffered)
    }

    /// Take a new snapshot from the engine.
    ///
    /// The loaded window only ever grows, so the selection stays on the
    /// same item.
    pub fn apply_snapshot(&mut self, snapshot: FeedSnapshot) {
        self.status = match snapshot.errors.last() {
            Some(e) if snapshot.state != FeedStatus::Succeeded => format!("Error: {e}"),
            _ => match snapshot.state {
                FeedStatus::Initializing => "Starting…".into(),
                FeedStatus::Fetching => "Fetching…".into(),
                FeedStatus::Succeeded if snapshot.has_more => "Up to date".into(),
                FeedStatus::Succeeded => "End of feed".into(),
            },
        };
        if let Some(selected) = self.list_state.selected() {
            if selected >= snapshot.items.len() {
                self.list_state
                    .select(snapshot.items.len().checked_sub(1));
            }
        }
        self.snapshot = Some(snapshot);
        self.maybe_load_more();
    }

    pub fn show_error(&mut self, message: &str) {
        self.status = format!("Error: {message}");
    }

    /// Drain the commands produced since the last call.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.outbox)
    }

    // -- navigation ----------------------------------------------------------

    pub fn select_next(&mut self) {
        let len = self.items().len();
        if len == 0 {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => (i + 1).min(len - 1),
            None => 0,
        };
        self.list_state.select(Some(i));
        self.maybe_load_more();
    }

    pub fn select_previous(&mut self) {
        if self.items().is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => i.saturating_sub(1),
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    pub fn select_first(&mut self) {
        if !self.items().is_empty() {
            self.list_state.select(Some(0));
        }
    }

    pub fn select_last(&mut self) {
        let len = self.items().len();
        if len > 0 {
            self.list_state.select(Some(len - 1));
            self.maybe_load_more();
        }
    }

    // -- feed control --------------------------------------------------------

    /// Switch to the next sort mode.  The engine starts a fresh feed.
    pub fn cycle_sort(&mut self) {
        self.sort = self.sort.next();
        self.restart();
        self.outbox.push(Command::SetSort(self.sort));
    }

    /// Go back to the first page.
    pub fn reset(&mut self) {
        self.restart();
        self.outbox.push(Command::Reset);
    }

    fn restart(&mut self) {
        self.snapshot = None;
        self.list_state.select(None);
        self.requested_at_page = None;
        self.status = "Reloading…".into();
    }

    /// Ask for the next page when the selection nears the end of the
    /// loaded window.  At most once per page.
    fn maybe_load_more(&mut self) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };
        let Some(selected) = self.list_state.selected() else {
            return;
        };
        if !snapshot.has_more || selected + LOAD_AHEAD < snapshot.items.len() {
            return;
        }
        if self.requested_at_page == Some(snapshot.page_number) {
            return;
        }
        self.requested_at_page = Some(snapshot.page_number);
        self.outbox.push(Command::LoadMore);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livescroll::source::Cid;
    use livescroll::{FeedError, SourceAddress};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn make_item(n: usize) -> Item {
        Item {
            cid: Some(Cid::new(format!("cid-{n}"))),
            source: SourceAddress::new("https://example.com/feed.xml"),
            author_address: "Example".into(),
            timestamp: 1_767_225_600 - n as i64 * 60,
            updated_at: None,
            upvote_count: 0,
            downvote_count: 0,
            reply_count: 0,
            pinned: false,
            title: Some(format!("Post {n}")),
            content: None,
            link: None,
            pending: false,
        }
    }

    fn snapshot(count: usize, page_number: usize, has_more: bool) -> FeedSnapshot {
        FeedSnapshot {
            items: (0..count).map(make_item).collect(),
            has_more,
            state: FeedStatus::Succeeded,
            errors: vec![],
            buffered: 7,
            page_number,
        }
    }

    fn render(app: &mut App) -> String {
        let backend = TestBackend::new(100, 24);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| crate::ui::draw(app, f)).unwrap();
        let buf = terminal.backend().buffer().clone();
        buf.content()
            .iter()
            .map(|c| c.symbol().chars().next().unwrap_or(' '))
            .collect()
    }

    // -- construction --------------------------------------------------------

    #[test]
    fn new_app_starts_empty() {
        let app = App::new(SortType::Hot);
        assert!(app.items().is_empty());
        assert!(!app.quit);
        assert!(app.list_state.selected().is_none());
    }

    // -- snapshots -----------------------------------------------------------

    #[test]
    fn snapshot_replaces_items_and_status() {
        let mut app = App::new(SortType::New);
        app.apply_snapshot(snapshot(3, 1, true));
        assert_eq!(app.items().len(), 3);
        assert_eq!(app.status, "Up to date");

        app.apply_snapshot(snapshot(3, 1, false));
        assert_eq!(app.status, "End of feed");
    }

    #[test]
    fn fetch_errors_show_while_fetching() {
        let mut app = App::new(SortType::New);
        let mut failing = snapshot(0, 1, true);
        failing.state = FeedStatus::Fetching;
        failing.errors.push(FeedError::Fetch {
            address: SourceAddress::new("https://example.com/feed.xml"),
            message: "timed out".into(),
        });
        app.apply_snapshot(failing);
        assert!(app.status.starts_with("Error: fetching https://example.com/feed.xml"));
    }

    // -- navigation ----------------------------------------------------------

    #[test]
    fn navigation_on_empty_is_noop() {
        let mut app = App::new(SortType::Hot);
        app.select_next();
        app.select_previous();
        app.select_first();
        app.select_last();
        assert!(app.list_state.selected().is_none());
        assert!(app.take_commands().is_empty());
    }

    #[test]
    fn select_next_advances_and_clamps() {
        let mut app = App::new(SortType::Hot);
        app.apply_snapshot(snapshot(3, 1, false));

        app.select_next();
        assert_eq!(app.list_state.selected(), Some(0));
        app.select_next();
        app.select_next();
        app.select_next();
        assert_eq!(app.list_state.selected(), Some(2));

        app.select_previous();
        assert_eq!(app.list_state.selected(), Some(1));
        app.select_first();
        app.select_previous();
        assert_eq!(app.list_state.selected(), Some(0));
    }

    #[test]
    fn nearing_the_end_requests_one_more_page() {
        let mut app = App::new(SortType::Hot);
        app.apply_snapshot(snapshot(25, 1, true));

        app.select_first();
        assert!(app.take_commands().is_empty());

        app.select_last();
        app.select_previous();
        app.select_next();
        assert_eq!(app.take_commands(), vec![Command::LoadMore]);

        // The next page arrives; near its end we ask again.
        app.apply_snapshot(snapshot(50, 2, true));
        assert!(app.take_commands().is_empty());
        app.select_last();
        assert_eq!(app.take_commands(), vec![Command::LoadMore]);
    }

    #[test]
    fn exhausted_feed_requests_nothing() {
        let mut app = App::new(SortType::Hot);
        app.apply_snapshot(snapshot(10, 1, false));
        app.select_last();
        assert!(app.take_commands().is_empty());
    }

    #[test]
    fn cycling_sort_restarts_the_feed() {
        let mut app = App::new(SortType::Hot);
        app.apply_snapshot(snapshot(10, 1, true));
        app.select_first();

        app.cycle_sort();
        assert_eq!(app.sort, SortType::New);
        assert!(app.items().is_empty());
        assert!(app.list_state.selected().is_none());
        assert_eq!(app.take_commands(), vec![Command::SetSort(SortType::New)]);

        app.reset();
        assert_eq!(app.take_commands(), vec![Command::Reset]);
    }

    // -- rendering (smoke tests) ---------------------------------------------

    #[test]
    fn draw_does_not_panic_with_no_items() {
        let mut app = App::new(SortType::Hot);
        render(&mut app);
    }

    #[test]
    fn draw_shows_items_sort_and_counts() {
        let mut app = App::new(SortType::Hot);
        app.apply_snapshot(snapshot(3, 1, true));
        app.select_first();

        let text = render(&mut app);
        assert!(text.contains("Post 0"));
        assert!(text.contains("hot"), "title shows the sort mode");
        assert!(text.contains("3 items"), "status bar should show item count");
        assert!(text.contains("7 buffered"));
    }

    #[test]
    fn draw_marks_pending_items() {
        let mut app = App::new(SortType::New);
        let mut pending = snapshot(1, 1, false);
        pending.items[0].cid = None;
        pending.items[0].pending = true;
        app.apply_snapshot(pending);

        assert!(render(&mut app).contains("(pending)"));
    }
}
