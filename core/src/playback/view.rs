use chronicle_types::TimelineEntry;

/// The presentation side of narration: panels, scrolling and the speaking
/// indicator. Indices refer to the entries in rendered order.
pub trait TimelineView: Send + 'static {
    fn expand(&mut self, index: usize);
    fn collapse(&mut self, index: usize);
    fn scroll_into_view(&mut self, index: usize);
    fn set_speaking(&mut self, index: usize, speaking: bool);
    /// "Play all" started (`true`) or ended
    fn sequence_changed(&mut self, active: bool);
    fn narration_failed(&mut self, index: usize, reason: &str);

    fn entries_replaced(&mut self, _entries: &[TimelineEntry]) {}
}
