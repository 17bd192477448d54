use std::sync::Arc;
use std::time::Instant;

use crossterm::event::Event;
use crossterm::event::EventStream;
use crossterm::event::KeyCode;
use crossterm::event::KeyEvent;
use crossterm::event::KeyEventKind;
use crossterm::event::KeyModifiers;
use futures::StreamExt;
use quill_core::CompletionEvent;
use quill_core::CompletionRequest;
use quill_core::ModelClient;
use quill_core::PredictionEngine;
use quill_core::StoryContext;
use quill_core::Trigger;
use quill_core::config::Config;
use quill_core::config::MAX_PREDICTION_LENGTH;
use quill_core::config::MIN_PREDICTION_LENGTH;
use quill_core::store::DraftStore;
use ratatui::Frame;
use ratatui::layout::Constraint;
use ratatui::layout::Layout;
use ratatui::style::Color;
use ratatui::style::Modifier;
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::text::Span;
use ratatui::widgets::Block;
use ratatui::widgets::Borders;
use ratatui::widgets::Paragraph;
use ratatui::widgets::Wrap;
use tokio::sync::mpsc;
use tracing::warn;

use crate::app_event::AppEvent;
use crate::tui::Tui;

const LENGTH_STEP: u16 = 10;

pub(crate) struct App {
    config: Arc<Config>,
    client: ModelClient,
    store: DraftStore,
    story: StoryContext,
    prediction_length: u16,
    document: String,
    engine: PredictionEngine,
    app_event_tx: mpsc::UnboundedSender<AppEvent>,
    app_event_rx: mpsc::UnboundedReceiver<AppEvent>,
    /// Transient error from a manual trigger, shown in the status line
    /// until the next edit. Automatic-trigger failures never land here.
    flash_error: Option<String>,
    should_quit: bool,
}

impl App {
    pub(crate) fn new(
        config: Arc<Config>,
        store: DraftStore,
        story: StoryContext,
        prediction_length: u16,
        document: String,
    ) -> Self {
        let (app_event_tx, app_event_rx) = mpsc::unbounded_channel();
        let engine = PredictionEngine::new(document.chars().count());
        let client = ModelClient::new(Arc::clone(&config));
        Self {
            config,
            client,
            store,
            story,
            prediction_length,
            document,
            engine,
            app_event_tx,
            app_event_rx,
            flash_error: None,
            should_quit: false,
        }
    }

    pub(crate) async fn run(mut self, terminal: &mut Tui) -> anyhow::Result<()> {
        let mut events = EventStream::new();
        while !self.should_quit {
            terminal.draw(|frame| self.render(frame))?;

            let deadline = self.engine.debounce_deadline();
            tokio::select! {
                event = events.next() => match event {
                    Some(Ok(Event::Key(key))) if key.kind != KeyEventKind::Release => {
                        self.handle_key(key).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                    None => break,
                },
                app_event = self.app_event_rx.recv() => {
                    if let Some(app_event) = app_event {
                        self.handle_app_event(app_event);
                    }
                },
                _ = sleep_until_or_forever(deadline) => {
                    if self.engine.poll_debounce(&self.document, Instant::now()) {
                        self.spawn_prediction(Trigger::Debounce);
                    }
                },
            }
        }
        self.persist_draft().await;
        Ok(())
    }

    async fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('q') | KeyCode::Char('c') => self.should_quit = true,
                KeyCode::Char('p') => {
                    self.engine.manual_trigger();
                    self.spawn_prediction(Trigger::Manual);
                }
                KeyCode::Up => self.adjust_prediction_length(LENGTH_STEP as i32).await,
                KeyCode::Down => self.adjust_prediction_length(-(LENGTH_STEP as i32)).await,
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Tab => {
                if self.engine.accept(&mut self.document) {
                    self.persist_draft().await;
                }
            }
            KeyCode::Esc => self.engine.dismiss(),
            KeyCode::Enter => {
                self.document.push('\n');
                self.after_edit().await;
            }
            KeyCode::Backspace => {
                if self.document.pop().is_some() {
                    self.after_edit().await;
                }
            }
            KeyCode::Char(ch) => {
                self.document.push(ch);
                self.after_edit().await;
            }
            _ => {}
        }
    }

    /// Runs after every document mutation, in arrival order: tracker update
    /// first, then the trigger decision, then persistence.
    async fn after_edit(&mut self) {
        self.flash_error = None;
        if let Some(trigger) = self.engine.on_edit(&self.document, Instant::now()) {
            self.spawn_prediction(trigger);
        }
        self.persist_draft().await;
    }

    fn handle_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::SuggestionFrame {
                generation,
                content,
            } => {
                self.engine.apply_frame(generation, &content);
            }
            AppEvent::SuggestionCompleted {
                generation,
                content,
            } => {
                self.engine.apply_frame(generation, &content);
                self.engine.finish_request(generation);
            }
            AppEvent::SuggestionFailed {
                generation,
                manual,
                message,
            } => {
                self.engine.fail_request(generation);
                warn!("prediction failed: {message}");
                if manual {
                    self.flash_error = Some(message);
                }
            }
        }
    }

    /// Registers a new request with the engine and forwards its frames into
    /// the app-event channel. The stream task never touches editor state.
    fn spawn_prediction(&mut self, trigger: Trigger) {
        let generation = self.engine.begin_request();
        let request = CompletionRequest::new(&self.story, self.prediction_length, &self.document);
        let client = self.client.clone();
        let tx = self.app_event_tx.clone();
        let manual = trigger.is_manual();
        tokio::spawn(async move {
            let mut stream = match client.stream_completion(&request).await {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = tx.send(AppEvent::SuggestionFailed {
                        generation,
                        manual,
                        message: err.to_string(),
                    });
                    return;
                }
            };
            loop {
                match stream.next().await {
                    Some(Ok(CompletionEvent::Delta { content })) => {
                        if tx
                            .send(AppEvent::SuggestionFrame {
                                generation,
                                content,
                            })
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(Ok(CompletionEvent::Completed { content })) => {
                        let _ = tx.send(AppEvent::SuggestionCompleted {
                            generation,
                            content,
                        });
                        return;
                    }
                    Some(Err(err)) => {
                        let _ = tx.send(AppEvent::SuggestionFailed {
                            generation,
                            manual,
                            message: err.to_string(),
                        });
                        return;
                    }
                    None => return,
                }
            }
        });
    }

    async fn adjust_prediction_length(&mut self, step: i32) {
        let adjusted = (i32::from(self.prediction_length) + step)
            .clamp(i32::from(MIN_PREDICTION_LENGTH), i32::from(MAX_PREDICTION_LENGTH))
            as u16;
        if adjusted == self.prediction_length {
            return;
        }
        self.prediction_length = adjusted;
        if let Err(err) = self.store.save_story(&self.story, self.prediction_length).await {
            warn!("failed to save story settings: {err}");
        }
    }

    /// Draft-save failures must not crash the editor session.
    async fn persist_draft(&self) {
        if let Err(err) = self.store.save_draft(&self.document).await {
            warn!("failed to save draft: {err}");
        }
    }

    fn render(&self, frame: &mut Frame) {
        let [body, status] =
            Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(frame.area());

        let title = format!(" {} ", self.store.draft_path().display());
        let manuscript = Paragraph::new(manuscript_lines(&self.document, self.engine.suggestion()))
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(manuscript, body);

        frame.render_widget(Line::from(self.status_spans()), status);
    }

    fn status_spans(&self) -> Vec<Span<'_>> {
        let mut spans = vec![
            Span::raw(format!(" {} ", self.config.model)),
            Span::raw(format!("· {} chars ", self.document.chars().count())),
            Span::raw(format!("· length {} ", self.prediction_length)),
        ];
        if self.engine.is_loading() {
            spans.push(Span::styled(
                "· predicting… ",
                Style::default().add_modifier(Modifier::ITALIC),
            ));
        }
        if let Some(error) = &self.flash_error {
            spans.push(Span::styled(
                format!("· {error} "),
                Style::default().fg(Color::Red),
            ));
        } else {
            spans.push(Span::styled(
                "· Tab accept · Esc dismiss · ^P predict · ^↑/^↓ length · ^Q quit",
                Style::default().add_modifier(Modifier::DIM),
            ));
        }
        spans
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

/// Splits document and suggestion into display lines, joining the two at
/// the boundary line so the suggestion reads as a dim continuation of the
/// final paragraph.
fn manuscript_lines<'a>(document: &'a str, suggestion: Option<&'a str>) -> Vec<Line<'a>> {
    let dim = Style::default().add_modifier(Modifier::DIM | Modifier::ITALIC);
    let mut lines: Vec<Line<'a>> = document
        .split('\n')
        .map(|part| Line::from(Span::raw(part)))
        .collect();

    if let Some(suggestion) = suggestion {
        let mut parts = suggestion.split('\n');
        if let (Some(first), Some(last)) = (parts.next(), lines.last_mut()) {
            last.spans.push(Span::styled(first, dim));
        }
        for part in parts {
            lines.push(Line::from(Span::styled(part, dim)));
        }
    }
    lines
}
