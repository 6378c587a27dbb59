//! Note → voice table with release-aware teardown.
//!
//! At most one live voice per note key. Retriggering a key releases the
//! voice already on it before the new one is inserted; released voices keep
//! sounding until their teardown comes due in the [`Schedule`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::expr::ParamValues;
use crate::generator::Generator;
use crate::rack::Rack;
use crate::schedule::{Schedule, Teardown};

use super::{PitchBend, Player, PlayerError};

/// Identity of one voice, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub(crate) u64);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

#[derive(Debug)]
struct Voice {
    key: u8,
    player: Player,
}

/// Every voice of one patch, held or releasing.
#[derive(Debug)]
pub struct VoiceTable<'r> {
    rack: &'r Rack,
    generator: Arc<Generator>,
    held: HashMap<u8, VoiceId>,
    voices: BTreeMap<VoiceId, Voice>,
    schedule: Schedule,
    next_id: u64,
}

impl<'r> VoiceTable<'r> {
    pub fn new(generator: Arc<Generator>, rack: &'r Rack) -> Self {
        Self {
            rack,
            generator,
            held: HashMap::new(),
            voices: BTreeMap::new(),
            schedule: Schedule::new(),
            next_id: 0,
        }
    }

    /// Start a voice on `key`, releasing whatever was held there.
    ///
    /// With `duration` the note is fixed-length: its release is scheduled
    /// right away.
    pub fn note_on(
        &mut self,
        key: u8,
        overrides: &ParamValues,
        when: f64,
        duration: Option<f64>,
        bend: Option<PitchBend>,
    ) -> Result<VoiceId, PlayerError> {
        self.release_key(key, when);

        let mut player = Player::new(Arc::clone(&self.generator), overrides, self.rack)?;
        player.start(when, duration, bend);

        let id = VoiceId(self.next_id);
        self.next_id += 1;

        if let Some(duration) = duration {
            let at = player.stop_after_release(when + duration);
            self.schedule.push(Teardown { at, voice: id });
        }
        self.voices.insert(id, Voice { key, player });
        self.held.insert(key, id);
        debug!(%id, key, when, "note on");
        Ok(id)
    }

    /// Release the voice held on `key`. Returns its teardown time.
    pub fn note_off(&mut self, key: u8, when: f64) -> Option<f64> {
        let at = self.release_key(key, when);
        debug!(key, when, teardown = ?at, "note off");
        at
    }

    fn release_key(&mut self, key: u8, when: f64) -> Option<f64> {
        let id = self.held.remove(&key)?;
        let voice = self.voices.get_mut(&id)?;
        let at = voice.player.stop_after_release(when);
        self.schedule.push(Teardown { at, voice: id });
        Some(at)
    }

    /// Drop every voice whose teardown is due by `now`.
    pub fn advance(&mut self, now: f64) -> Vec<VoiceId> {
        let mut dropped = Vec::new();
        for teardown in self.schedule.drain_due(now) {
            let Some(voice) = self.voices.remove(&teardown.voice) else {
                continue;
            };
            if self.held.get(&voice.key) == Some(&teardown.voice) {
                self.held.remove(&voice.key);
            }
            dropped.push(teardown.voice);
        }
        dropped
    }

    /// Broadcast a live tweak to every voice, releasing ones included.
    ///
    /// A voice that rejects the tweak keeps its previous state; the rest
    /// still receive it. Failures are returned per voice.
    pub fn apply_tweak_now(
        &mut self,
        name: &str,
        value: f64,
    ) -> Result<(), Vec<(VoiceId, PlayerError)>> {
        let mut failed = Vec::new();
        for (id, voice) in self.voices.iter_mut() {
            if let Err(e) = voice.player.apply_tweak_now(name, value) {
                warn!(%id, name, value, error = %e, "live tweak rejected");
                failed.push((*id, e));
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(failed)
        }
    }

    /// Silence and drop everything now.
    pub fn panic(&mut self, now: f64) {
        for voice in self.voices.values_mut() {
            voice.player.stop_immediately(now);
        }
        self.voices.clear();
        self.held.clear();
        self.schedule.clear();
    }

    /// The voice currently held on `key`.
    pub fn held(&self, key: u8) -> Option<VoiceId> {
        self.held.get(&key).copied()
    }

    pub fn player(&self, id: VoiceId) -> Option<&Player> {
        self.voices.get(&id).map(|v| &v.player)
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Voices still allocated, held or releasing.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::Compiler;
    use assert_approx_eq::assert_approx_eq;

    const SOURCE: &str = "\
@synth pluck
@end
SAW-OSC:osc
VCA:amp
ADSR:env
osc.out -> amp.in
amp.out -> audio.in
env.out -> amp.level
osc.pitch = param.pitch
audio.level = param.level
env.release = 0.25
";

    fn table(rack: &Rack) -> VoiceTable<'_> {
        let generator = Arc::new(Compiler::compile(SOURCE, rack).unwrap());
        VoiceTable::new(generator, rack)
    }

    fn pitch(hz: f64) -> ParamValues {
        ParamValues::from([("pitch".to_string(), hz)])
    }

    #[test]
    fn held_note_is_torn_down_after_release() {
        let rack = Rack::default();
        let mut voices = table(&rack);
        let id = voices.note_on(60, &pitch(261.63), 0.0, None, None).unwrap();
        assert!(voices.schedule().is_empty());

        let at = voices.note_off(60, 1.0).unwrap();
        assert_approx_eq!(at, 1.25);
        assert_eq!(voices.held(60), None);
        assert!(voices.advance(1.2).is_empty());
        assert_eq!(voices.advance(1.25), vec![id]);
        assert!(voices.is_empty());
    }

    #[test]
    fn retrigger_evicts_previous_voice() {
        let rack = Rack::default();
        let mut voices = table(&rack);
        let first = voices.note_on(60, &pitch(261.63), 0.0, None, None).unwrap();
        let second = voices.note_on(60, &pitch(261.63), 0.5, None, None).unwrap();

        assert_ne!(first, second);
        assert_eq!(voices.held(60), Some(second));
        assert_eq!(voices.len(), 2);
        assert_eq!(voices.schedule().len(), 1);
        assert_eq!(
            voices.player(first).unwrap().instance("osc").unwrap().lifetime().stopped,
            Some(0.75)
        );
    }

    #[test]
    fn stale_teardown_spares_new_voice() {
        let rack = Rack::default();
        let mut voices = table(&rack);
        let first = voices.note_on(60, &pitch(261.63), 0.0, None, None).unwrap();
        voices.note_off(60, 0.1);
        let second = voices.note_on(60, &pitch(261.63), 0.2, None, None).unwrap();

        assert_eq!(voices.advance(0.4), vec![first]);
        assert_eq!(voices.held(60), Some(second));
        assert!(voices.player(second).is_some());
    }

    #[test]
    fn fixed_duration_note_schedules_its_own_teardown() {
        let rack = Rack::default();
        let mut voices = table(&rack);
        let id = voices.note_on(64, &pitch(329.63), 0.0, Some(1.0), None).unwrap();
        assert_eq!(voices.schedule().next_due(), Some(1.25));
        assert_eq!(voices.advance(2.0), vec![id]);
        assert_eq!(voices.held(64), None);
    }

    #[test]
    fn keys_are_independent() {
        let rack = Rack::default();
        let mut voices = table(&rack);
        voices.note_on(60, &pitch(261.63), 0.0, None, None).unwrap();
        voices.note_on(64, &pitch(329.63), 0.0, None, None).unwrap();
        assert_eq!(voices.len(), 2);
        assert!(voices.note_off(67, 1.0).is_none());
    }

    #[test]
    fn tweak_reaches_releasing_voices() {
        let rack = Rack::default();
        let mut voices = table(&rack);
        let first = voices.note_on(60, &pitch(261.63), 0.0, None, None).unwrap();
        voices.note_off(60, 0.5);
        let second = voices.note_on(62, &pitch(293.66), 0.5, None, None).unwrap();

        voices.apply_tweak_now("level", 0.3).unwrap();
        for id in [first, second] {
            let player = voices.player(id).unwrap();
            let level = player.instance("audio").unwrap().param("level").unwrap();
            assert_approx_eq!(level.value(), 0.3);
        }
    }

    #[test]
    fn rejected_tweak_still_reaches_other_voices() {
        let source = "\
@synth divider
@end
@param sweep
min: 0
max: 4
default: 1
@end
SAW-OSC:osc
VCA:amp
osc.out -> amp.in
amp.out -> audio.in
amp.level = param.sweep
osc.detune = 1 / (param.sweep - param.pitch / 100)
";
        let rack = Rack::default();
        let generator = Arc::new(Compiler::compile(source, &rack).unwrap());
        let mut voices = VoiceTable::new(generator, &rack);
        let low = voices.note_on(57, &pitch(220.0), 0.0, None, None).unwrap();
        let high = voices.note_on(69, &pitch(440.0), 0.0, None, None).unwrap();

        let failed = voices.apply_tweak_now("sweep", 2.2).unwrap_err();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, low);

        let level = |id| {
            let player = voices.player(id).unwrap();
            player.instance("amp").unwrap().param("level").unwrap().value()
        };
        assert_approx_eq!(level(low), 1.0);
        assert_approx_eq!(level(high), 2.2);
    }

    #[test]
    fn panic_clears_everything() {
        let rack = Rack::default();
        let mut voices = table(&rack);
        voices.note_on(60, &pitch(261.63), 0.0, None, None).unwrap();
        voices.note_on(62, &pitch(293.66), 0.0, Some(1.0), None).unwrap();
        voices.panic(0.5);
        assert!(voices.is_empty());
        assert!(voices.schedule().is_empty());
        assert_eq!(voices.held(60), None);
    }
}
