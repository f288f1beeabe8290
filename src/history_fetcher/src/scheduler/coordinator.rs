//! The coordinating task that owns every piece of scheduling state.
//!
//! Nothing here is shared: provider calls run in spawned tasks that report back over
//! the completion channel, and callers talk to the coordinator through
//! [`SchedulerHandle`](super::SchedulerHandle) commands. The coordinator suspends on
//! exactly three things (the in-flight ceiling, pacing windows, and completions it
//! needs before deferred requests can go out) and always waits on the completion
//! channel, the command channel and the pacing deadline together.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::Arc,
};

use candle_engine::{CandleSeries, SeriesError};
use chrono::NaiveDate;
use indexmap::IndexMap;
use tokio::{
    sync::mpsc::{self, error::TryRecvError},
    time::{Duration, Instant, sleep_until},
};
use tracing::{debug, error, info, warn};

use super::{
    RunReport,
    handle::Command,
    plan::expand_session,
    summary::{ProgressSnapshot, RunSummary},
};
use crate::{
    config::FetcherConfig,
    models::{
        Bar, BarRequest, HistoricalRequest, IndicatorKind, Instrument, RequestKey, SeriesKey,
        Session, bar_size,
    },
    pacing::Pacer,
    progress::ProgressListener,
    providers::{DataProvider, ErrorClass, ProviderError},
    store::CandleStore,
};

/// Outcome of one provider call, sent back by its worker task.
#[derive(Debug)]
struct Completion {
    request_id: u64,
    result: Result<Vec<Bar>, ProviderError>,
}

#[derive(Debug, Default)]
struct SessionQueue {
    queued: VecDeque<BarRequest>,
    deferred: VecDeque<BarRequest>,
}

pub(crate) struct Coordinator {
    config: FetcherConfig,
    provider: Arc<dyn DataProvider>,
    store: Arc<dyn CandleStore>,
    listener: Arc<dyn ProgressListener>,

    commands: mpsc::UnboundedReceiver<Command>,
    commands_open: bool,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,

    pacer: Pacer,
    sessions: BTreeMap<NaiveDate, SessionQueue>,
    /// Deferred requests cleared for submission, ahead of the session queues.
    ready: VecDeque<BarRequest>,
    in_flight: HashMap<u64, BarRequest>,
    /// A request is taken off its queue and waits for a submission slot.
    holding: bool,
    busy: HashSet<Instrument>,
    known: HashSet<RequestKey>,

    series: IndexMap<SeriesKey, CandleSeries>,
    attached: HashSet<(SeriesKey, IndicatorKind)>,
    /// Sealed candles already handed to the store, per series.
    persisted: HashMap<SeriesKey, usize>,

    next_id: u64,
    summary: RunSummary,
    /// In-flight ceiling, at least one so a submission can always make progress.
    max_in_flight: usize,
    since_resubmit: usize,
    resubmit_every: usize,
    cancelled: bool,
}

impl Coordinator {
    pub(crate) fn new(
        config: FetcherConfig,
        provider: Arc<dyn DataProvider>,
        store: Arc<dyn CandleStore>,
        listener: Arc<dyn ProgressListener>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            pacer: Pacer::new(config.limits()),
            max_in_flight: config.max_in_flight.max(1),
            resubmit_every: config.resubmit.initial.max(1),
            config,
            provider,
            store,
            listener,
            commands,
            commands_open: true,
            done_tx,
            done_rx,
            sessions: BTreeMap::new(),
            ready: VecDeque::new(),
            in_flight: HashMap::new(),
            holding: false,
            busy: HashSet::new(),
            known: HashSet::new(),
            series: IndexMap::new(),
            attached: HashSet::new(),
            persisted: HashMap::new(),
            next_id: 1,
            summary: RunSummary::default(),
            since_resubmit: 0,
            cancelled: false,
        }
    }

    pub(crate) async fn run(mut self, initial: Vec<Session>) -> RunReport {
        self.next_id = match self.store.find_max_assigned_request_key().await {
            Ok(Some(max)) => max + 1,
            Ok(None) => 1,
            Err(e) => {
                warn!(error = %e, "could not read last request id, starting at 1");
                1
            }
        };
        self.add_sessions(initial);

        loop {
            self.poll_commands();
            if self.cancelled {
                break;
            }
            if let Some(request) = self.next_submittable() {
                self.holding = true;
                let slot = self.wait_for_slot().await;
                self.holding = false;
                if !slot {
                    // Cancelled while waiting; the request is counted as abandoned.
                    self.ready.push_front(request);
                    break;
                }
                self.submit(request);
                continue;
            }
            if self.in_flight.is_empty() {
                if self.deferred_len() > 0 && self.revisit_deferred() > 0 {
                    continue;
                }
                break;
            }
            self.wait_for_completion().await;
            if self.queued_len() == 0 {
                self.revisit_deferred();
            }
        }

        while !self.in_flight.is_empty() {
            self.wait_for_completion().await;
        }
        self.finish()
    }

    // -------------------- commands --------------------

    fn poll_commands(&mut self) {
        while self.commands_open {
            match self.commands.try_recv() {
                Ok(cmd) => self.handle_command(Some(cmd)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.commands_open = false,
            }
        }
    }

    fn handle_command(&mut self, cmd: Option<Command>) {
        match cmd {
            Some(Command::AddSessions(sessions)) => self.add_sessions(sessions),
            Some(Command::Cancel) => {
                if !self.cancelled {
                    info!(in_flight = self.in_flight.len(), "cancel requested");
                    self.cancelled = true;
                }
            }
            Some(Command::Progress(reply)) => {
                let _ = reply.send(self.snapshot());
            }
            None => self.commands_open = false,
        }
    }

    fn add_sessions(&mut self, mut sessions: Vec<Session>) {
        sessions.sort_by_key(|s| s.date);
        for session in sessions {
            let expanded = expand_session(&session, self.config.backfill_bar_seconds);

            for msg in &expanded.corrections {
                warn!(date = %session.date, "request corrected: {msg}");
                self.listener.on_information_message(msg);
            }
            for r in &expanded.rejected {
                error!(
                    symbol = %r.instrument,
                    bar_seconds = r.bar_seconds,
                    target_seconds = r.target_seconds,
                    error = %r.error,
                    "request rejected"
                );
                self.summary.grand_total += 1;
                self.summary.failed += 1;
            }
            for (key, kind) in expanded.attachments {
                self.attach(key, kind);
            }

            let queue = self.sessions.entry(session.date).or_default();
            let mut added = 0;
            for request in expanded.requests {
                if !self.known.insert(request.key.clone()) {
                    debug!(key = ?request.key, "request already scheduled");
                    continue;
                }
                if request.dirty {
                    self.summary.dirty += 1;
                }
                self.summary.grand_total += 1;
                queue.queued.push_back(request);
                added += 1;
            }
            info!(
                date = %session.date,
                strategies = session.strategies.len(),
                requests = added,
                grand_total = self.summary.grand_total,
                "session queued"
            );
        }
    }

    fn attach(&mut self, key: SeriesKey, kind: IndicatorKind) {
        if !self.attached.insert((key.clone(), kind)) {
            return;
        }
        match kind.build() {
            Ok(indicator) => self.series_mut(&key).attach_indicator(indicator),
            Err(e) => error!(series = %key, error = %e, "indicator rejected"),
        }
    }

    fn series_mut(&mut self, key: &SeriesKey) -> &mut CandleSeries {
        let anchor = self.config.session.anchor();
        self.series.entry(key.clone()).or_insert_with(|| {
            CandleSeries::new(key.instrument.symbol.clone(), key.target_seconds, anchor)
        })
    }

    // -------------------- selection --------------------

    fn is_blocked(&self, instrument: &Instrument) -> bool {
        self.busy.contains(instrument)
            || self.ready.iter().any(|r| r.instrument() == instrument)
            || self
                .sessions
                .values()
                .any(|q| q.deferred.iter().any(|r| r.instrument() == instrument))
    }

    fn defer(&mut self, request: BarRequest) {
        debug!(
            symbol = %request.instrument(),
            bar_size = %bar_size::label(request.key.bar_seconds),
            "deferred behind in-flight request"
        );
        self.summary.deferrals += 1;
        self.sessions
            .entry(request.key.session_date)
            .or_default()
            .deferred
            .push_back(request);
    }

    /// Next request that may be submitted now, deferring conflicting ones on the way.
    fn next_submittable(&mut self) -> Option<BarRequest> {
        while let Some(request) = self.ready.pop_front() {
            if self.busy.contains(request.instrument()) {
                self.defer(request);
            } else {
                return Some(request);
            }
        }

        loop {
            let (request, exhausted) = {
                let queue = self.sessions.values_mut().find(|q| !q.queued.is_empty())?;
                let request = queue.queued.pop_front()?;
                (request, queue.queued.is_empty())
            };
            let candidate = if self.is_blocked(request.instrument()) {
                self.defer(request);
                None
            } else {
                Some(request)
            };
            if exhausted {
                self.revisit_deferred();
            }
            if candidate.is_some() {
                return candidate;
            }
            if let Some(request) = self.ready.pop_front() {
                return Some(request);
            }
        }
    }

    /// Move the oldest deferred request of every idle instrument to the ready queue,
    /// in session order. Returns how many were moved.
    fn revisit_deferred(&mut self) -> usize {
        let mut taken: HashSet<Instrument> =
            self.ready.iter().map(|r| r.instrument().clone()).collect();
        let mut moved = 0;
        for queue in self.sessions.values_mut() {
            let mut keep = VecDeque::with_capacity(queue.deferred.len());
            while let Some(request) = queue.deferred.pop_front() {
                let instrument = request.instrument().clone();
                let free = !self.busy.contains(&instrument) && !taken.contains(&instrument);
                taken.insert(instrument);
                if free {
                    self.ready.push_back(request);
                    moved += 1;
                } else {
                    keep.push_back(request);
                }
            }
            queue.deferred = keep;
        }
        if moved > 0 {
            debug!(moved, still_deferred = self.deferred_len(), "deferred requests released");
        }
        moved
    }

    // -------------------- submission --------------------

    /// Wait until the in-flight ceiling and every pacing window allow a submission.
    /// Returns `false` when the run was cancelled meanwhile.
    async fn wait_for_slot(&mut self) -> bool {
        let notice_every = Duration::from_secs(self.config.wait_notice_secs.max(1));
        let mut waiting_since: Option<Instant> = None;
        let mut next_notice: Option<Instant> = None;

        loop {
            self.poll_commands();
            if self.cancelled {
                return false;
            }
            if self.in_flight.len() >= self.max_in_flight {
                self.wait_for_completion().await;
                continue;
            }

            let now = Instant::now();
            let Some(ready_at) = self.pacer.ready_at(now) else {
                return true;
            };
            let since = *waiting_since.get_or_insert_with(|| {
                debug!(
                    recent = self.pacer.recent(now),
                    wait_ms = (ready_at - now).as_millis() as u64,
                    "pacing limit reached"
                );
                now
            });
            let notice_at = *next_notice.get_or_insert(since + notice_every);

            tokio::select! {
                Some(done) = self.done_rx.recv() => self.handle_completion(done).await,
                cmd = self.commands.recv(), if self.commands_open => self.handle_command(cmd),
                _ = sleep_until(ready_at.min(notice_at)) => {
                    let now = Instant::now();
                    if now >= notice_at && now < ready_at {
                        let msg = format!(
                            "Pacing: please wait, next request in {}s ({}s waited)",
                            (ready_at - now).as_secs(),
                            (now - since).as_secs()
                        );
                        info!("{msg}");
                        self.listener.on_information_message(&msg);
                        next_notice = Some(notice_at + notice_every);
                    }
                }
            }
        }
    }

    fn submit(&mut self, request: BarRequest) {
        let request_id = self.next_id;
        self.next_id += 1;
        self.pacer.record(Instant::now());

        let historical = HistoricalRequest {
            request_id,
            instrument: request.key.instrument.clone(),
            end_time: request.end,
            duration_days: request.key.lookback_days,
            bar_seconds: request.key.bar_seconds,
            what_to_show: self.config.request.what_to_show,
            use_rth: self.config.request.use_rth,
            date_format: self.config.request.date_format,
        };
        debug!(
            request_id,
            symbol = %historical.instrument,
            kind = ?request.kind,
            dirty = request.dirty,
            "submitting {historical}"
        );

        self.busy.insert(request.key.instrument.clone());
        self.in_flight.insert(request_id, request);
        self.summary.submitted += 1;

        let provider = Arc::clone(&self.provider);
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let result = provider.fetch_history(&historical).await;
            let _ = done.send(Completion {
                request_id: historical.request_id,
                result,
            });
        });

        self.listener.on_progress_percent(self.summary.percent());

        self.since_resubmit += 1;
        if self.since_resubmit >= self.resubmit_every {
            self.since_resubmit = 0;
            self.resubmit_every += self.config.resubmit.growth;
            self.revisit_deferred();
        }
    }

    // -------------------- completion --------------------

    async fn wait_for_completion(&mut self) {
        tokio::select! {
            Some(done) = self.done_rx.recv() => self.handle_completion(done).await,
            cmd = self.commands.recv(), if self.commands_open => self.handle_command(cmd),
        }
    }

    async fn handle_completion(&mut self, done: Completion) {
        let Some(request) = self.in_flight.remove(&done.request_id) else {
            warn!(request_id = done.request_id, "completion for unknown request");
            return;
        };
        self.busy.remove(request.instrument());
        let symbol = request.key.instrument.symbol.as_str();

        match done.result {
            Ok(bars) => match self.apply_bars(&request, &bars) {
                Ok(touched) => {
                    self.summary.completed += 1;
                    debug!(request_id = done.request_id, %symbol, bars = bars.len(), "request completed");
                    self.persist_closed(&touched).await;
                }
                Err(e) => {
                    error!(request_id = done.request_id, %symbol, error = %e, "candle series rejected bars");
                    self.summary.failed += 1;
                }
            },
            Err(e) => {
                let (code, message) = (e.code(), e.message());
                self.listener.on_request_error(symbol, code, &message);
                match e.class() {
                    ErrorClass::PacingViolation => {
                        warn!(request_id = done.request_id, %symbol, code, "pacing violation: {message}");
                        self.summary.completed += 1;
                        self.summary.pacing_violations += 1;
                    }
                    ErrorClass::NoData => {
                        info!(request_id = done.request_id, %symbol, code, "no data: {message}");
                        self.summary.completed += 1;
                        self.summary.no_data += 1;
                    }
                    ErrorClass::Fatal => {
                        error!(request_id = done.request_id, %symbol, code, error = %e, "request failed");
                        self.summary.failed += 1;
                    }
                }
            }
        }
    }

    /// Feed bars into every series the request serves and seal what the request
    /// window proves closed.
    fn apply_bars(
        &mut self,
        request: &BarRequest,
        bars: &[Bar],
    ) -> Result<Vec<SeriesKey>, SeriesError> {
        let mut touched = Vec::new();
        for key in request.series_keys() {
            let ratio = key.target_seconds / key.base_seconds.max(1);
            let series = self.series_mut(&key);
            for bar in bars {
                series.build_candle(&bar.to_sample(), ratio)?;
            }
            series.seal_at(request.end);
            touched.push(key);
        }
        Ok(touched)
    }

    async fn persist_closed(&mut self, keys: &[SeriesKey]) {
        for key in keys {
            let cursor = self.persisted.get(key).copied().unwrap_or(0);
            let fresh = match self.series.get(key) {
                Some(series) => series.closed()[cursor.min(series.closed_len())..].to_vec(),
                None => continue,
            };
            if fresh.is_empty() {
                continue;
            }
            for candle in &fresh {
                if let Err(e) = self.store.persist_closed_candle(key, candle).await {
                    error!(series = %key, period_start = %candle.period_start, error = %e, "failed to persist candle");
                }
            }
            self.persisted.insert(key.clone(), cursor + fresh.len());
            debug!(series = %key, candles = fresh.len(), "persisted closed candles");
        }
    }

    // -------------------- accounting --------------------

    fn queued_len(&self) -> usize {
        self.sessions.values().map(|q| q.queued.len()).sum()
    }

    fn deferred_len(&self) -> usize {
        self.sessions.values().map(|q| q.deferred.len()).sum()
    }

    fn snapshot(&self) -> ProgressSnapshot {
        let deferred = self.deferred_len();
        ProgressSnapshot {
            grand_total: self.summary.grand_total,
            submitted: self.summary.submitted,
            completed: self.summary.completed,
            failed: self.summary.failed,
            in_flight: self.in_flight.len(),
            deferred,
            pending: self.queued_len()
                + deferred
                + self.ready.len()
                + self.in_flight.len()
                + usize::from(self.holding),
            percent: self.summary.percent(),
            cancelled: self.cancelled,
        }
    }

    fn finish(mut self) -> RunReport {
        self.summary.abandoned = self.queued_len() + self.deferred_len() + self.ready.len();
        self.summary.cancelled = self.cancelled;
        if self.summary.abandoned > 0 {
            info!(abandoned = self.summary.abandoned, "run ended with unsubmitted requests");
        }
        info!(
            submitted = self.summary.submitted,
            completed = self.summary.completed,
            failed = self.summary.failed,
            no_data = self.summary.no_data,
            pacing_violations = self.summary.pacing_violations,
            "run finished"
        );
        RunReport {
            summary: self.summary,
            series: self.series,
        }
    }
}
