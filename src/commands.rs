use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::calendar::{self, MonthView};
use crate::dates;
use crate::error::{CommandError, CommandResult};
use crate::insights;
use crate::models::*;
use crate::prediction::{self, IrregularityPolicy};
use crate::storage::{CycleStore, StorageError};

/// Where the session gets "today" from.
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    System,
    Fixed(NaiveDate),
}

impl Clock {
    pub fn today(&self) -> NaiveDate {
        match self {
            Clock::System => dates::today(),
            Clock::Fixed(date) => *date,
        }
    }
}

/// A signed-in user's view of their data.
///
/// Holds a cache of the store rows. The cache is only touched after the
/// corresponding store write succeeded.
pub struct Session {
    user_id: String,
    store: Box<dyn CycleStore>,
    profile: UserProfile,
    cycles: Vec<CycleRecord>,
    policy: IrregularityPolicy,
    clock: Clock,
}

#[derive(Debug, Serialize)]
struct Export<'a> {
    profile: &'a UserProfile,
    cycles: &'a [CycleRecord],
}

impl Session {
    /// Load (or create) the profile and the full cycle history.
    pub fn sign_in(
        user_id: impl Into<String>,
        mut store: Box<dyn CycleStore>,
        policy: IrregularityPolicy,
        clock: Clock,
    ) -> CommandResult<Self> {
        let user_id = user_id.into();
        let profile = match store.load_profile()? {
            Some(profile) => profile,
            None => {
                let profile = UserProfile::new(user_id.clone(), clock.today());
                store.save_profile(&profile)?;
                info!(user = %user_id, "created default profile");
                profile
            }
        };
        let cycles = store.list_cycles()?;
        info!(user = %user_id, cycles = cycles.len(), "signed in");

        Ok(Self {
            user_id,
            store,
            profile,
            cycles,
            policy,
            clock,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// Cached cycles, newest first.
    pub fn cycles(&self) -> &[CycleRecord] {
        &self.cycles
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn current_cycle(&self) -> Option<&CycleRecord> {
        prediction::most_recent_cycle(&self.cycles)
    }

    fn current_cycle_id(&self) -> CommandResult<Uuid> {
        self.current_cycle()
            .map(|c| c.id)
            .ok_or(CommandError::NoActiveCycle)
    }

    pub fn entry_for_date(&self, date: NaiveDate) -> Option<&DayRecord> {
        self.cycles.iter().find_map(|c| c.day(date))
    }

    pub fn today_entry(&self) -> Option<&DayRecord> {
        let today = self.today();
        self.current_cycle().and_then(|c| c.day(today))
    }

    fn stored<T>(&self, what: &str, result: Result<T, StorageError>) -> CommandResult<T> {
        result.map_err(|e| {
            error!(user = %self.user_id, error = %e, "failed to {what}");
            CommandError::Store(e)
        })
    }

    pub fn log_period_start(&mut self, date: NaiveDate) -> CommandResult<()> {
        if date > self.today() {
            return Err(CommandError::FutureDate {
                what: "start",
                date,
            });
        }

        if self.cycles.iter().any(|c| c.start_date == date) {
            return Err(CommandError::DuplicateCycleStart(date));
        }

        let result = self.store.find_day(date);
        let day = match self.stored("look up day", result)? {
            Some(mut existing) => {
                existing.flow = Some(FlowIntensity::Medium);
                existing
            }
            None => DayRecord::with_flow(date, FlowIntensity::Medium),
        };
        let mut cycle = CycleRecord::new(date);
        cycle.put_day(day);

        let result = self.store.insert_cycle(&cycle);
        self.stored("create cycle", result)?;

        for other in &mut self.cycles {
            other.days.retain(|d| d.date != date);
        }
        let idx = self
            .cycles
            .iter()
            .position(|c| c.start_date < date)
            .unwrap_or(self.cycles.len());
        self.cycles.insert(idx, cycle);

        info!(user = %self.user_id, %date, "period start logged");
        Ok(())
    }

    pub fn log_period_end(&mut self, date: NaiveDate) -> CommandResult<()> {
        let current = self
            .current_cycle()
            .filter(|c| c.is_open())
            .ok_or(CommandError::NoActiveCycle)?;

        if date > self.today() {
            return Err(CommandError::FutureDate { what: "end", date });
        }
        if date < current.start_date {
            return Err(CommandError::EndBeforeStart {
                start: current.start_date,
                end: date,
            });
        }

        let mut closed = current.clone();
        closed.end_date = Some(date);
        closed.length = Some((dates::days_between(closed.start_date, date) + 1) as u32);

        let result = self.store.update_cycle(&closed);
        self.stored("close cycle", result)?;

        let length = closed.length;
        if let Some(slot) = self.cycles.iter_mut().find(|c| c.id == closed.id) {
            *slot = closed;
        }
        info!(user = %self.user_id, %date, ?length, "period end logged");

        if let Some((cycle_avg, period_avg)) = prediction::recompute_averages(&self.cycles) {
            self.update_profile(ProfileUpdate {
                cycle_average_length: Some(cycle_avg),
                period_average_length: Some(period_avg),
                ..ProfileUpdate::default()
            })?;
        }
        Ok(())
    }

    /// Read-modify-write the day record for `date`, creating it in the
    /// current cycle when it does not exist yet.
    fn write_day<F>(&mut self, date: NaiveDate, change: F) -> CommandResult<DayRecord>
    where
        F: FnOnce(&mut DayRecord),
    {
        let current_id = self.current_cycle_id()?;

        let result = self.store.find_day(date);
        let mut day = self
            .stored("look up day", result)?
            .unwrap_or_else(|| DayRecord::new(date));
        change(&mut day);

        let holder = self
            .cycles
            .iter()
            .position(|c| c.day(date).is_some());
        let link = if holder.is_some() { None } else { Some(current_id) };

        let result = self.store.upsert_day(&day, link);
        self.stored("save day", result)?;

        let idx = holder
            .or_else(|| self.cycles.iter().position(|c| c.id == current_id))
            .ok_or(CommandError::NoActiveCycle)?;
        self.cycles[idx].put_day(day.clone());
        Ok(day)
    }

    pub fn log_flow(&mut self, date: NaiveDate, flow: FlowIntensity) -> CommandResult<DayRecord> {
        let day = self.write_day(date, |day| day.flow = Some(flow))?;
        info!(user = %self.user_id, %date, ?flow, "flow logged");
        Ok(day)
    }

    /// Add or remove a symptom tag. Removing from a day with no record is a no-op.
    pub fn log_symptom(
        &mut self,
        date: NaiveDate,
        symptom: Symptom,
        add: bool,
    ) -> CommandResult<Option<DayRecord>> {
        self.current_cycle_id()?;
        if !add {
            let result = self.store.find_day(date);
            if self.stored("look up day", result)?.is_none() {
                return Ok(None);
            }
        }

        let day = self.write_day(date, |day| {
            if add {
                day.symptoms.insert(symptom);
            } else {
                day.symptoms.remove(&symptom);
            }
        })?;
        info!(
            user = %self.user_id,
            %date,
            symptom = symptom.as_str(),
            add,
            "symptom logged"
        );
        Ok(Some(day))
    }

    pub fn log_note(&mut self, date: NaiveDate, note: impl Into<String>) -> CommandResult<DayRecord> {
        let note = note.into();
        let day = self.write_day(date, |day| day.notes = Some(note))?;
        info!(user = %self.user_id, %date, "note saved");
        Ok(day)
    }

    pub fn update_profile(&mut self, update: ProfileUpdate) -> CommandResult<&UserProfile> {
        let mut next = self.profile.clone();
        update.apply(&mut next, self.today());

        let result = self.store.save_profile(&next);
        self.stored("update profile", result)?;
        self.profile = next;

        info!(
            user = %self.user_id,
            cycle_avg = self.profile.cycle_average_length,
            period_avg = self.profile.period_average_length,
            "profile updated"
        );
        Ok(&self.profile)
    }

    /// Phase, next-period forecast and insights as of `reference`.
    pub fn overview(&self, reference: NaiveDate) -> Overview {
        let cycle_len = self.profile.cycle_length();
        let latest = self.current_cycle();

        let phase = latest.map(|c| {
            prediction::classify_phase(
                reference,
                c.start_date,
                Some(cycle_len),
                Some(self.profile.period_length()),
            )
        });

        Overview {
            reference,
            phase,
            phase_info: phase.map(|p| p.info()),
            next_period: latest.map(|c| prediction::predict_next(c.start_date, cycle_len)),
            insights: insights::generate_insights(&self.cycles, cycle_len, &self.policy, self.today()),
        }
    }

    pub fn stats(&self) -> CycleStats {
        prediction::cycle_stats(&self.cycles, &self.profile)
    }

    pub fn month(&self, year: i32, month: u32) -> CommandResult<MonthView> {
        Ok(calendar::month_view(year, month, &self.cycles, &self.profile)?)
    }

    pub fn export(&self) -> CommandResult<String> {
        Ok(serde_json::to_string_pretty(&Export {
            profile: &self.profile,
            cycles: &self.cycles,
        })?)
    }

    /// Delete everything stored for this user. The session ends either way.
    pub fn wipe(mut self) -> CommandResult<()> {
        let result = self.store.wipe();
        self.stored("wipe data", result)?;
        info!(user = %self.user_id, "all data wiped");
        Ok(())
    }
}

/// Application state: at most one signed-in session.
#[derive(Default)]
pub struct AppState {
    session: Option<Session>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(
        &mut self,
        user_id: impl Into<String>,
        store: Box<dyn CycleStore>,
        policy: IrregularityPolicy,
        clock: Clock,
    ) -> CommandResult<&mut Session> {
        self.sign_out();
        Ok(self
            .session
            .insert(Session::sign_in(user_id, store, policy, clock)?))
    }

    /// Drop the cache and the store handle.
    pub fn sign_out(&mut self) {
        if let Some(session) = self.session.take() {
            info!(user = %session.user_id, "signed out");
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> CommandResult<&Session> {
        self.session.as_ref().ok_or(CommandError::SignedOut)
    }

    pub fn session_mut(&mut self) -> CommandResult<&mut Session> {
        self.session.as_mut().ok_or(CommandError::SignedOut)
    }

    pub fn wipe_all_data(&mut self) -> CommandResult<()> {
        self.session.take().ok_or(CommandError::SignedOut)?.wipe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    /// Accepts everything except day upserts.
    struct DayWritesFail(MemoryStore);

    impl CycleStore for DayWritesFail {
        fn load_profile(&self) -> Result<Option<UserProfile>, StorageError> {
            self.0.load_profile()
        }
        fn save_profile(&mut self, profile: &UserProfile) -> Result<(), StorageError> {
            self.0.save_profile(profile)
        }
        fn list_cycles(&self) -> Result<Vec<CycleRecord>, StorageError> {
            self.0.list_cycles()
        }
        fn insert_cycle(&mut self, cycle: &CycleRecord) -> Result<(), StorageError> {
            self.0.insert_cycle(cycle)
        }
        fn update_cycle(&mut self, cycle: &CycleRecord) -> Result<(), StorageError> {
            self.0.update_cycle(cycle)
        }
        fn find_day(&self, date: NaiveDate) -> Result<Option<DayRecord>, StorageError> {
            self.0.find_day(date)
        }
        fn upsert_day(&mut self, _day: &DayRecord, _cycle_id: Option<Uuid>) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("day writes disabled".into()))
        }
        fn wipe(&mut self) -> Result<(), StorageError> {
            self.0.wipe()
        }
    }

    fn starts(cycles: &[CycleRecord]) -> Vec<NaiveDate> {
        cycles.iter().map(|c| c.start_date).collect()
    }

    fn d(s: &str) -> NaiveDate {
        dates::parse(s).unwrap()
    }

    fn session_on(today: &str) -> Session {
        Session::sign_in(
            "user1",
            Box::new(MemoryStore::new()),
            IrregularityPolicy::default(),
            Clock::Fixed(d(today)),
        )
        .unwrap()
    }

    #[test]
    fn sign_in_creates_default_profile() {
        let session = session_on("2024-01-01");
        assert_eq!(session.profile().cycle_average_length, 28);
        assert_eq!(session.profile().period_average_length, 5);
        assert!(session.cycles().is_empty());
        assert_eq!(session.overview(d("2024-01-01")).insights[0].title, "Getting Started");
    }

    #[test]
    fn period_start_creates_cycle_with_medium_flow() {
        let mut session = session_on("2024-01-02");
        session.log_period_start(d("2024-01-01")).unwrap();

        let current = session.current_cycle().unwrap();
        assert_eq!(current.start_date, d("2024-01-01"));
        assert_eq!(current.days.len(), 1);
        assert_eq!(current.days[0].flow, Some(FlowIntensity::Medium));
    }

    #[test]
    fn future_start_is_rejected_without_writing() {
        let mut session = session_on("2024-01-01");
        let err = session.log_period_start(d("2024-01-02")).unwrap_err();
        assert!(matches!(err, CommandError::FutureDate { what: "start", .. }));
        assert!(session.cycles().is_empty());
        assert!(session.store.list_cycles().unwrap().is_empty());
    }

    #[test]
    fn end_before_start_and_future_end_are_rejected() {
        let mut session = session_on("2024-01-10");
        session.log_period_start(d("2024-01-05")).unwrap();

        assert!(matches!(
            session.log_period_end(d("2024-01-04")),
            Err(CommandError::EndBeforeStart { .. })
        ));
        assert!(matches!(
            session.log_period_end(d("2024-01-11")),
            Err(CommandError::FutureDate { what: "end", .. })
        ));
        assert!(session.current_cycle().unwrap().is_open());
    }

    #[test]
    fn end_without_open_cycle_fails() {
        let mut session = session_on("2024-01-10");
        assert!(matches!(
            session.log_period_end(d("2024-01-09")),
            Err(CommandError::NoActiveCycle)
        ));
    }

    #[test]
    fn closing_a_cycle_sets_length_and_averages() {
        let mut session = session_on("2024-01-10");
        session.log_period_start(d("2024-01-01")).unwrap();
        for date in ["2024-01-02", "2024-01-03", "2024-01-04"] {
            session.log_flow(d(date), FlowIntensity::Light).unwrap();
        }
        session.log_period_end(d("2024-01-06")).unwrap();

        let current = session.current_cycle().unwrap();
        assert_eq!(current.end_date, Some(d("2024-01-06")));
        assert_eq!(current.length, Some(6));
        assert_eq!(session.profile().cycle_average_length, 6);
        assert_eq!(session.profile().period_average_length, 4);
        assert_eq!(session.profile().last_updated, d("2024-01-10"));

        // Closed exactly once.
        assert!(matches!(
            session.log_period_end(d("2024-01-07")),
            Err(CommandError::NoActiveCycle)
        ));
    }

    #[test]
    fn day_logs_update_in_place() {
        let mut session = session_on("2024-01-10");
        session.log_period_start(d("2024-01-01")).unwrap();

        session.log_flow(d("2024-01-01"), FlowIntensity::Heavy).unwrap();
        session.log_symptom(d("2024-01-01"), Symptom::Cramps, true).unwrap();
        session.log_symptom(d("2024-01-01"), Symptom::Cramps, true).unwrap();
        session.log_symptom(d("2024-01-01"), Symptom::Fatigue, true).unwrap();
        session.log_symptom(d("2024-01-01"), Symptom::Fatigue, false).unwrap();
        session.log_note(d("2024-01-01"), "rough day").unwrap();

        let day = session.entry_for_date(d("2024-01-01")).unwrap();
        assert_eq!(day.flow, Some(FlowIntensity::Heavy));
        assert_eq!(day.symptoms.iter().copied().collect::<Vec<_>>(), vec![Symptom::Cramps]);
        assert_eq!(day.notes.as_deref(), Some("rough day"));
        assert_eq!(session.current_cycle().unwrap().days.len(), 1);

        let stored = session.store.find_day(d("2024-01-01")).unwrap().unwrap();
        assert_eq!(&stored, day);
    }

    #[test]
    fn removing_symptom_from_missing_day_is_noop() {
        let mut session = session_on("2024-01-10");
        session.log_period_start(d("2024-01-01")).unwrap();
        let result = session.log_symptom(d("2024-01-05"), Symptom::Acne, false).unwrap();
        assert!(result.is_none());
        assert!(session.entry_for_date(d("2024-01-05")).is_none());
    }

    #[test]
    fn day_logging_needs_a_cycle() {
        let mut session = session_on("2024-01-10");
        assert!(matches!(
            session.log_note(d("2024-01-01"), "hi"),
            Err(CommandError::NoActiveCycle)
        ));
    }

    #[test]
    fn store_failure_leaves_cache_untouched() {
        let mut session = session_on("2024-01-10");
        session.log_period_start(d("2024-01-01")).unwrap();

        let mut failing = MemoryStore::new();
        failing.fail_writes(true);
        session.store = Box::new(failing);

        assert!(matches!(
            session.log_flow(d("2024-01-02"), FlowIntensity::Light),
            Err(CommandError::Store(_))
        ));
        assert!(matches!(
            session.log_period_end(d("2024-01-05")),
            Err(CommandError::Store(_))
        ));
        assert!(session.entry_for_date(d("2024-01-02")).is_none());
        assert!(session.current_cycle().unwrap().is_open());
        assert_eq!(session.profile().cycle_average_length, 28);
    }

    #[test]
    fn second_start_on_same_date_is_rejected() {
        let mut session = session_on("2024-01-10");
        session.log_period_start(d("2024-01-01")).unwrap();
        session.log_period_end(d("2024-01-05")).unwrap();

        assert!(matches!(
            session.log_period_start(d("2024-01-01")),
            Err(CommandError::DuplicateCycleStart(date)) if date == d("2024-01-01")
        ));
        assert_eq!(session.cycles().len(), 1);
        assert_eq!(session.store.list_cycles().unwrap().len(), 1);

        // A later start still becomes current and can be closed.
        session.log_period_start(d("2024-01-08")).unwrap();
        assert_eq!(session.current_cycle().unwrap().start_date, d("2024-01-08"));
        session.log_period_end(d("2024-01-09")).unwrap();
    }

    #[test]
    fn period_start_is_one_store_write() {
        let mut session = Session::sign_in(
            "user1",
            Box::new(DayWritesFail(MemoryStore::new())),
            IrregularityPolicy::default(),
            Clock::Fixed(d("2024-01-10")),
        )
        .unwrap();

        session.log_period_start(d("2024-01-01")).unwrap();
        let stored = session.store.list_cycles().unwrap();
        assert_eq!(session.cycles(), stored.as_slice());
        assert_eq!(stored[0].days[0].flow, Some(FlowIntensity::Medium));

        let mut failing = MemoryStore::new();
        failing.fail_writes(true);
        session.store = Box::new(failing);
        assert!(session.log_period_start(d("2024-01-05")).is_err());
        assert_eq!(session.cycles().len(), 1);
    }

    #[test]
    fn backdated_start_keeps_newest_first_order() {
        let mut session = session_on("2024-03-10");
        session.log_period_start(d("2024-03-01")).unwrap();
        session.log_period_end(d("2024-03-04")).unwrap();
        session.log_period_start(d("2024-01-01")).unwrap();
        session.log_period_start(d("2024-02-01")).unwrap();

        let expected = vec![d("2024-03-01"), d("2024-02-01"), d("2024-01-01")];
        assert_eq!(starts(session.cycles()), expected);
        assert_eq!(starts(&session.store.list_cycles().unwrap()), expected);
        assert_eq!(session.current_cycle().unwrap().start_date, d("2024-03-01"));

        let json: serde_json::Value = serde_json::from_str(&session.export().unwrap()).unwrap();
        assert_eq!(json["cycles"][1]["start_date"], "2024-02-01");
    }

    #[test]
    fn profile_update_only_touches_given_fields() {
        let mut session = session_on("2024-01-01");
        session
            .update_profile(ProfileUpdate {
                birthdate: Some(d("1995-06-15")),
                ..ProfileUpdate::default()
            })
            .unwrap();

        session.clock = Clock::Fixed(d("2024-02-01"));
        let profile = session
            .update_profile(ProfileUpdate {
                name: Some("Sam".into()),
                ..ProfileUpdate::default()
            })
            .unwrap()
            .clone();

        assert_eq!(profile.name, "Sam");
        assert_eq!(profile.birthdate, Some(d("1995-06-15")));
        assert_eq!(profile.height_cm, None);
        assert_eq!(profile.cycle_average_length, 28);
        assert_eq!(profile.period_average_length, 5);
        assert_eq!(profile.last_updated, d("2024-02-01"));
        assert_eq!(session.store.load_profile().unwrap(), Some(profile));
    }

    #[test]
    fn today_entry_follows_the_clock() {
        let mut session = session_on("2024-01-03");
        session.log_period_start(d("2024-01-01")).unwrap();
        assert!(session.today_entry().is_none());

        session.log_note(d("2024-01-03"), "headache").unwrap();
        assert_eq!(session.today_entry().unwrap().notes.as_deref(), Some("headache"));

        session.clock = Clock::Fixed(d("2024-01-01"));
        assert_eq!(session.today_entry().unwrap().flow, Some(FlowIntensity::Medium));
    }

    #[test]
    fn overview_reports_phase_and_prediction() {
        let mut session = session_on("2024-01-15");
        session.log_period_start(d("2024-01-01")).unwrap();

        let overview = session.overview(d("2024-01-15"));
        assert_eq!(overview.phase, Some(Phase::Ovulation));
        assert_eq!(overview.phase_info.unwrap().title, "Ovulation Phase");
        assert_eq!(overview.next_period, Some(d("2024-01-29")));
    }

    #[test]
    fn export_contains_profile_and_cycles() {
        let mut session = session_on("2024-01-10");
        session.log_period_start(d("2024-01-01")).unwrap();
        let json = session.export().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["profile"]["id"], "user1");
        assert_eq!(value["cycles"][0]["start_date"], "2024-01-01");
    }

    #[test]
    fn app_state_sign_in_and_out() {
        let mut state = AppState::new();
        assert!(matches!(state.session(), Err(CommandError::SignedOut)));

        state
            .sign_in(
                "user1",
                Box::new(MemoryStore::new()),
                IrregularityPolicy::default(),
                Clock::Fixed(d("2024-01-10")),
            )
            .unwrap()
            .log_period_start(d("2024-01-01"))
            .unwrap();
        assert!(state.is_signed_in());
        assert_eq!(state.session().unwrap().cycles().len(), 1);

        state.sign_out();
        assert!(!state.is_signed_in());
        assert!(matches!(state.wipe_all_data(), Err(CommandError::SignedOut)));
    }
}
