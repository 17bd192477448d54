use quill_core::Generation;

/// Events funneled into the single-threaded app loop. Stream frames arrive
/// here from spawned forwarding tasks; only the loop itself touches editor
/// state, so network callbacks can never mutate the document directly.
#[derive(Debug)]
pub(crate) enum AppEvent {
    /// Cumulative suggestion text from the stream tagged `generation`.
    SuggestionFrame {
        generation: Generation,
        content: String,
    },
    SuggestionCompleted {
        generation: Generation,
        content: String,
    },
    SuggestionFailed {
        generation: Generation,
        manual: bool,
        message: String,
    },
}
