//! Bookmark tracking: capture after each unit of work, explicit forget.

use crate::context::Context;
use crate::driver::Bookmarks;
use tracing::debug;

impl Context {
    /// Read the session's most recent causal tokens onto the context and, unless bookmarks
    /// are ignored, stage them for the next session this context opens.
    pub(crate) fn capture_bookmarks(&mut self) {
        let Some(session) = self.lifecycle.session() else {
            return;
        };
        let bookmarks = session.last_bookmarks();
        if !self.config.ignore_bookmarks {
            self.session_config.bookmarks = bookmarks.clone();
        }
        debug!(context = self.id, bookmarks = %bookmarks, staged = !self.config.ignore_bookmarks, "Bookmarks captured");
        self.last_bookmarks = bookmarks;
    }

    /// Adopt bookmarks captured elsewhere (a stream sibling). Last writer wins.
    pub(crate) fn adopt_bookmarks(&mut self, bookmarks: Bookmarks) {
        if !self.config.ignore_bookmarks {
            self.session_config.bookmarks = bookmarks.clone();
        }
        self.last_bookmarks = bookmarks;
    }

    /// Start a fresh causal chain: clears stored and staged bookmarks.
    ///
    /// A session that is already open keeps the chain it was opened with; the next session
    /// starts without bookmarks.
    pub fn forget_bookmarks(&mut self) {
        self.last_bookmarks.clear();
        self.session_config.bookmarks.clear();
        debug!(context = self.id, "Bookmarks forgotten");
    }
}
