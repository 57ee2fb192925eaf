use super::*;

// ── Pane ──────────────────────────────────────────────────────────────────────

/// Which firing produced a pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaneTiming {
    /// Speculative result emitted before the window closed.
    Early,
    /// The single result emitted when the window closed.
    Final,
}

/// One firing of one (key, window).
///
/// Panes accumulate: every pane carries the full state of the window at the
/// time it fired. The grouping key is not part of the pane; consumers
/// identify the entity from `value` itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pane<OUT> {
    pub value: OUT,
    pub window: TimeWindow,
    pub timing: PaneTiming,
    /// Zero-based firing count for this window.
    pub index: u32,
}

impl<OUT> Pane<OUT> {
    pub fn is_final(&self) -> bool {
        self.timing == PaneTiming::Final
    }
}

/// Counters describing what the engine did with its input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorStats {
    /// Records folded into some window.
    pub records_accepted: u64,
    /// Records dropped because they carried no key.
    pub unkeyed_dropped: u64,
    /// Records dropped because their window had already closed.
    pub late_dropped: u64,
    /// Sessions absorbed when a record bridged two or more of them.
    pub sessions_merged: u64,
    pub early_panes: u64,
    pub final_panes: u64,
}

impl std::fmt::Display for AggregatorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "accepted={} unkeyed_dropped={} late_dropped={} merged={} early_panes={} final_panes={}",
            self.records_accepted,
            self.unkeyed_dropped,
            self.late_dropped,
            self.sessions_merged,
            self.early_panes,
            self.final_panes
        )
    }
}

// ── Internal state ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Session<ACC> {
    window: TimeWindow,
    acc: ACC,
    phase: WindowPhase,
    panes_fired: u32,
}

/// Open sessions of one key. The key itself is kept next to its serialized
/// form for logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeySessions<K, ACC> {
    key: K,
    sessions: Vec<Session<ACC>>,
}

#[derive(Serialize, Deserialize)]
struct SessionAggregatorSnapshot<K, ACC> {
    keys: HashMap<Vec<u8>, KeySessions<K, ACC>>,
    timers: WindowTimers,
    current_watermark: EventTime,
    current_processing_time: EventTime,
    stats: AggregatorStats,
}

// ── SessionAggregator ─────────────────────────────────────────────────────────

/// Keyed session-window aggregation engine.
///
/// Accepts [`StreamElement<T>`] items and emits [`StreamElement<Pane<OUT>>`]
/// items when windows fire.
///
/// # Processing model
///
/// - **Records**: keyed by `key_fn` (records without a key are dropped),
///   assigned a session window, merged with any overlapping session of the
///   same key, and folded into that session's accumulator.
/// - **Processing time** ([`on_processing_time`](Self::on_processing_time)):
///   emits the single early pane of every window whose delay has elapsed.
/// - **Watermarks**: emit the final pane of every window whose end plus
///   allowed lateness the watermark has reached, then discard it. The
///   watermark is re-emitted downstream unchanged.
/// - **End**: closes every remaining window.
///
/// No clock is read internally; both clocks only move when the caller says so.
///
/// # Failure
///
/// A window that fires with nothing to extract means `key_fn` and the
/// combine function disagree about which records count. The call that hits
/// it returns `Err` and the engine halts: every later call fails too, until
/// [`restore_state`](Self::restore_state) replaces its state.
pub struct SessionAggregator<K, T, ACC, OUT, KF, TF, CF>
where
    K: StreamData + std::fmt::Debug,
    ACC: StreamData,
    OUT: StreamData,
    KF: Fn(&T) -> Option<K> + Send,
    TF: Fn(&T) -> EventTime + Send,
    CF: CombineFn<T, ACC, OUT>,
{
    key_fn: KF,
    timestamp_fn: TF,
    assigner: SessionWindows,
    trigger: EarlyAndFinalTrigger,
    combine_fn: CF,
    /// key_bytes -> open sessions of that key.
    keys: HashMap<Vec<u8>, KeySessions<K, ACC>>,
    timers: WindowTimers,
    current_watermark: EventTime,
    current_processing_time: EventTime,
    stats: AggregatorStats,
    /// Set once an internal-consistency error halts the engine.
    halted: Option<String>,
    _phantom: PhantomData<fn(&T) -> OUT>,
}

impl<K, T, ACC, OUT, KF, TF, CF> SessionAggregator<K, T, ACC, OUT, KF, TF, CF>
where
    K: StreamData + std::fmt::Debug,
    ACC: StreamData,
    OUT: StreamData,
    KF: Fn(&T) -> Option<K> + Send,
    TF: Fn(&T) -> EventTime + Send,
    CF: CombineFn<T, ACC, OUT>,
{
    /// Create a new engine.
    ///
    /// - `key_fn`: extracts the grouping key; `None` marks a record unusable
    /// - `timestamp_fn`: event time for records that carry none
    /// - `config`: session gap, early firing delay and allowed lateness
    /// - `combine_fn`: the per-window accumulation
    pub fn new(key_fn: KF, timestamp_fn: TF, config: &WindowConfig, combine_fn: CF) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            key_fn,
            timestamp_fn,
            assigner: SessionWindows::with_gap_ms(config.gap_ms()),
            trigger: EarlyAndFinalTrigger::from_config(config),
            combine_fn,
            keys: HashMap::new(),
            timers: WindowTimers::new(),
            current_watermark: EVENT_TIME_MIN,
            current_processing_time: 0,
            stats: AggregatorStats::default(),
            halted: None,
            _phantom: PhantomData,
        })
    }

    /// Process one stream element and return any panes produced.
    pub fn process(&mut self, elem: StreamElement<T>) -> Result<Vec<StreamElement<Pane<OUT>>>> {
        self.ensure_running()?;
        match elem {
            StreamElement::Record(rec) => self.process_record(rec),

            StreamElement::Watermark(wm) => {
                let mut output = self.on_event_time(wm.timestamp)?;
                // Re-emit the watermark downstream so the pipeline keeps advancing.
                output.push(StreamElement::Watermark(wm));
                Ok(output)
            }

            StreamElement::End => {
                let mut output = self.on_event_time(EVENT_TIME_MAX)?;
                tracing::debug!(
                    "end of input: discarding {} pending early firings",
                    self.timers.pending(TimeDomain::ProcessingTime)
                );
                self.timers.clear(TimeDomain::ProcessingTime);
                output.push(StreamElement::End);
                Ok(output)
            }
        }
    }

    fn process_record(&mut self, rec: StreamRecord<T>) -> Result<Vec<StreamElement<Pane<OUT>>>> {
        let Some(key) = (self.key_fn)(&rec.value) else {
            self.stats.unkeyed_dropped += 1;
            tracing::warn!("dropping record without a key");
            return Ok(Vec::new());
        };
        let ts = rec
            .timestamp
            .unwrap_or_else(|| (self.timestamp_fn)(&rec.value));

        let proto = self.assigner.assign_window(ts);
        if self.trigger.is_expired(&proto, self.current_watermark) {
            self.stats.late_dropped += 1;
            tracing::warn!(
                "dropping late record for key {:?} at {}: {} closed before watermark {}",
                key,
                ts,
                proto,
                self.current_watermark
            );
            return Ok(Vec::new());
        }

        let key_bytes = bincode::serialize(&key)?;
        let entry = self
            .keys
            .entry(key_bytes.clone())
            .or_insert_with(|| KeySessions {
                key,
                sessions: Vec::new(),
            });

        let existing: Vec<TimeWindow> = entry.sessions.iter().map(|s| s.window).collect();
        let (mut indices, window) = self.assigner.merge_candidates(&existing, proto);

        // Remove back to front so earlier indices stay valid.
        indices.sort_unstable_by(|a, b| b.cmp(a));
        let absorbed: Vec<Session<ACC>> = indices
            .into_iter()
            .map(|i| entry.sessions.swap_remove(i))
            .collect();

        let retired: Vec<(TimeWindow, Option<EventTime>)> = absorbed
            .iter()
            .map(|s| (s.window, s.phase.early_fire_at()))
            .collect();

        let mut session = if absorbed.is_empty() {
            Session {
                window,
                acc: self.combine_fn.create_accumulator(),
                phase: self.trigger.open(self.current_processing_time),
                panes_fired: 0,
            }
        } else {
            if absorbed.len() > 1 {
                self.stats.sessions_merged += absorbed.len() as u64 - 1;
                tracing::debug!(
                    "key {:?}: merged {} sessions into {}",
                    entry.key,
                    absorbed.len(),
                    window
                );
            }
            let phase = self.trigger.merge_phases(absorbed.iter().map(|s| s.phase));
            let panes_fired = absorbed.iter().map(|s| s.panes_fired).max().unwrap_or(0);
            let acc = self
                .combine_fn
                .merge_accumulators(absorbed.into_iter().map(|s| s.acc));
            Session {
                window,
                acc,
                phase,
                panes_fired,
            }
        };

        self.combine_fn.add_input(&mut session.acc, &rec.value);
        let early_fire_at = session.phase.early_fire_at();
        entry.sessions.push(session);
        self.stats.records_accepted += 1;

        for (old_window, old_early) in retired {
            self.timers.cancel(
                TimeDomain::EventTime,
                &key_bytes,
                old_window,
                self.trigger.final_fire_time(&old_window),
            );
            if let Some(fire_at) = old_early {
                self.timers
                    .cancel(TimeDomain::ProcessingTime, &key_bytes, old_window, fire_at);
            }
        }

        self.timers.schedule(
            TimeDomain::EventTime,
            &key_bytes,
            window,
            self.trigger.final_fire_time(&window),
        );
        if let Some(fire_at) = early_fire_at {
            self.timers
                .schedule(TimeDomain::ProcessingTime, &key_bytes, window, fire_at);
        }

        Ok(Vec::new())
    }

    /// Advance event time to `event_time` and emit the final pane of every
    /// window that closes.
    ///
    /// This is the explicit timer callback path; unlike a watermark passed to
    /// [`process`](Self::process), nothing is forwarded downstream.
    pub fn on_event_time(&mut self, event_time: EventTime) -> Result<Vec<StreamElement<Pane<OUT>>>> {
        self.ensure_running()?;
        self.current_watermark = self.current_watermark.max(event_time);
        let now = self.current_watermark;

        let mut output = Vec::new();
        while let Some(timer) = self.timers.pop_due(TimeDomain::EventTime, now) {
            if let Err(err) = self.fire_final(&timer, now, &mut output) {
                return Err(self.halt(err));
            }
        }
        Ok(output)
    }

    fn fire_final(
        &mut self,
        timer: &WindowTimer,
        now: EventTime,
        output: &mut Vec<StreamElement<Pane<OUT>>>,
    ) -> Result<()> {
        let Some(entry) = self.keys.get_mut(&timer.key_bytes) else {
            return Ok(());
        };
        let Some(pos) = entry.sessions.iter().position(|s| s.window == timer.window) else {
            return Ok(());
        };

        let pending_early = entry.sessions[pos].phase.early_fire_at();
        let result = self
            .trigger
            .on_event_time(&mut entry.sessions[pos].phase, &timer.window, now);
        if !result.is_fire() {
            return Ok(());
        }

        output.push(Self::fire(
            &self.combine_fn,
            &mut entry.sessions[pos],
            PaneTiming::Final,
        )?);
        self.stats.final_panes += 1;
        tracing::debug!("key {:?}: final pane for {}", entry.key, timer.window);

        if result.is_purge() {
            entry.sessions.swap_remove(pos);
            if entry.sessions.is_empty() {
                self.keys.remove(&timer.key_bytes);
            }
            if let Some(fire_at) = pending_early {
                self.timers.cancel(
                    TimeDomain::ProcessingTime,
                    &timer.key_bytes,
                    timer.window,
                    fire_at,
                );
            }
        }
        Ok(())
    }

    /// Advance processing time to `now` and emit the early pane of every
    /// window whose delay has elapsed.
    pub fn on_processing_time(&mut self, now: EventTime) -> Result<Vec<StreamElement<Pane<OUT>>>> {
        self.ensure_running()?;
        self.current_processing_time = self.current_processing_time.max(now);
        let now = self.current_processing_time;

        let mut output = Vec::new();
        while let Some(timer) = self.timers.pop_due(TimeDomain::ProcessingTime, now) {
            if let Err(err) = self.fire_early(&timer, now, &mut output) {
                return Err(self.halt(err));
            }
        }
        Ok(output)
    }

    fn fire_early(
        &mut self,
        timer: &WindowTimer,
        now: EventTime,
        output: &mut Vec<StreamElement<Pane<OUT>>>,
    ) -> Result<()> {
        let Some(entry) = self.keys.get_mut(&timer.key_bytes) else {
            return Ok(());
        };
        let Some(session) = entry
            .sessions
            .iter_mut()
            .find(|s| s.window == timer.window)
        else {
            return Ok(());
        };

        if self.trigger.on_processing_time(&mut session.phase, now).is_fire() {
            output.push(Self::fire(&self.combine_fn, session, PaneTiming::Early)?);
            self.stats.early_panes += 1;
            tracing::debug!("key {:?}: early pane for {}", entry.key, timer.window);
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        match &self.halted {
            Some(reason) => bail!("aggregator halted by an earlier failure: {reason}"),
            None => Ok(()),
        }
    }

    fn halt(&mut self, err: anyhow::Error) -> anyhow::Error {
        tracing::error!("halting aggregation: {:#}", err);
        self.halted = Some(format!("{err:#}"));
        err
    }

    fn fire(
        combine_fn: &CF,
        session: &mut Session<ACC>,
        timing: PaneTiming,
    ) -> Result<StreamElement<Pane<OUT>>> {
        let Some(value) = combine_fn.extract_output(&session.acc) else {
            bail!(
                "window {} fired with an empty accumulator after accepting input",
                session.window
            );
        };
        let pane = Pane {
            value,
            window: session.window,
            timing,
            index: session.panes_fired,
        };
        session.panes_fired += 1;
        Ok(StreamElement::timestamped_record(
            pane,
            session.window.max_timestamp(),
        ))
    }

    /// Snapshot open sessions, timers and clocks.
    pub fn snapshot_state(&self) -> Result<Vec<u8>> {
        let snapshot = SessionAggregatorSnapshot {
            keys: self.keys.clone(),
            timers: self.timers.clone(),
            current_watermark: self.current_watermark,
            current_processing_time: self.current_processing_time,
            stats: self.stats,
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    /// Restore state written by [`snapshot_state`](Self::snapshot_state).
    /// An empty snapshot resets the engine. Either way a halted engine runs
    /// again.
    pub fn restore_state(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            self.keys.clear();
            self.timers = WindowTimers::new();
            self.halted = None;
            self.current_watermark = EVENT_TIME_MIN;
            self.current_processing_time = 0;
            self.stats = AggregatorStats::default();
            return Ok(());
        }

        let snapshot: SessionAggregatorSnapshot<K, ACC> = bincode::deserialize(data)?;
        self.keys = snapshot.keys;
        self.timers = snapshot.timers;
        self.halted = None;
        self.current_watermark = snapshot.current_watermark;
        self.current_processing_time = snapshot.current_processing_time;
        self.stats = snapshot.stats;
        Ok(())
    }

    /// Return the number of currently open (key, window) pairs.
    pub fn open_window_count(&self) -> usize {
        self.keys.values().map(|e| e.sessions.len()).sum()
    }

    /// Return the open windows of `key`, ordered by start.
    pub fn open_windows(&self, key: &K) -> Result<Vec<TimeWindow>> {
        let key_bytes = bincode::serialize(key)?;
        let mut windows: Vec<TimeWindow> = self
            .keys
            .get(&key_bytes)
            .map(|e| e.sessions.iter().map(|s| s.window).collect())
            .unwrap_or_default();
        windows.sort_by_key(|w| w.start);
        Ok(windows)
    }

    pub fn current_watermark(&self) -> EventTime {
        self.current_watermark
    }

    pub fn current_processing_time(&self) -> EventTime {
        self.current_processing_time
    }

    pub fn stats(&self) -> AggregatorStats {
        self.stats
    }
}
