//! Parameter automation: a timeline of scheduled value changes.
//!
//! Mirrors the automation model of common audio backends: an intrinsic value
//! plus time-stamped events (set, linear ramp, exponential ramp, exponential
//! approach to a target). Modules expose their settable properties and
//! modulatable inputs as [`ParamHandle`]s, which envelopes hold on to so a
//! release can be scheduled after the attack was.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// What happens at an automation event's time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ramp {
    /// Jump to the value.
    Set(f64),
    /// Arrive at the value, interpolating linearly from the previous event.
    Linear(f64),
    /// Arrive at the value, interpolating exponentially from the previous event.
    Exponential(f64),
    /// Start approaching `target` with the given time constant.
    Target { target: f64, time_constant: f64 },
}

/// A scheduled automation event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationEvent {
    pub time: f64,
    pub ramp: Ramp,
}

/// Intrinsic value plus ordered automation events.
#[derive(Debug, Clone, PartialEq)]
pub struct Automation {
    value: f64,
    events: Vec<AutomationEvent>,
}

impl Automation {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            events: Vec::new(),
        }
    }

    /// The intrinsic value, used before any event applies.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    pub fn set_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(time, Ramp::Set(value));
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(time, Ramp::Linear(value));
    }

    pub fn exponential_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(time, Ramp::Exponential(value));
    }

    pub fn set_target_at_time(&mut self, target: f64, time: f64, time_constant: f64) {
        self.insert(
            time,
            Ramp::Target {
                target,
                time_constant,
            },
        );
    }

    /// Drop every event scheduled at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|e| e.time < time);
    }

    /// Events at equal times keep their insertion order.
    fn insert(&mut self, time: f64, ramp: Ramp) {
        let idx = self.events.partition_point(|e| e.time <= time);
        self.events.insert(idx, AutomationEvent { time, ramp });
    }

    /// The automated value at time `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        let mut anchor = Anchor {
            time: 0.0,
            value: self.value,
            approach: None,
        };

        for event in &self.events {
            if event.time > t {
                return match event.ramp {
                    Ramp::Linear(end) => anchor.linear(t, event.time, end),
                    Ramp::Exponential(end) => anchor.exponential(t, event.time, end),
                    _ => anchor.held(t),
                };
            }
            anchor = match event.ramp {
                Ramp::Set(v) | Ramp::Linear(v) | Ramp::Exponential(v) => Anchor {
                    time: event.time,
                    value: v,
                    approach: None,
                },
                Ramp::Target {
                    target,
                    time_constant,
                } => Anchor {
                    time: event.time,
                    value: anchor.held(event.time),
                    approach: Some((target, time_constant)),
                },
            };
        }

        anchor.held(t)
    }
}

/// The last settled point of the timeline.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    time: f64,
    value: f64,
    approach: Option<(f64, f64)>,
}

impl Anchor {
    fn held(&self, t: f64) -> f64 {
        match self.approach {
            Some((target, tau)) if tau > 0.0 && t > self.time => {
                target + (self.value - target) * (-(t - self.time) / tau).exp()
            }
            Some((target, _)) if t > self.time => target,
            _ => self.value,
        }
    }

    fn linear(&self, t: f64, end_time: f64, end: f64) -> f64 {
        let start = self.held(self.time);
        let span = end_time - self.time;
        if span <= 0.0 {
            return end;
        }
        start + (end - start) * ((t - self.time) / span).max(0.0)
    }

    fn exponential(&self, t: f64, end_time: f64, end: f64) -> f64 {
        let start = self.held(self.time);
        let span = end_time - self.time;
        if span <= 0.0 {
            return end;
        }
        if start * end <= 0.0 {
            return self.held(t);
        }
        start * (end / start).powf(((t - self.time) / span).max(0.0))
    }
}

/// Shared handle to one module's automatable property.
#[derive(Clone, PartialEq)]
pub struct ParamHandle(Rc<RefCell<Automation>>);

impl ParamHandle {
    pub fn new(value: f64) -> Self {
        Self(Rc::new(RefCell::new(Automation::new(value))))
    }

    pub fn value(&self) -> f64 {
        self.0.borrow().value()
    }

    pub fn set_value(&self, value: f64) {
        self.0.borrow_mut().set_value(value);
    }

    pub fn value_at(&self, t: f64) -> f64 {
        self.0.borrow().value_at(t)
    }

    pub fn set_value_at_time(&self, value: f64, time: f64) {
        self.0.borrow_mut().set_value_at_time(value, time);
    }

    pub fn linear_ramp_to_value_at_time(&self, value: f64, time: f64) {
        self.0.borrow_mut().linear_ramp_to_value_at_time(value, time);
    }

    pub fn exponential_ramp_to_value_at_time(&self, value: f64, time: f64) {
        self.0
            .borrow_mut()
            .exponential_ramp_to_value_at_time(value, time);
    }

    pub fn set_target_at_time(&self, target: f64, time: f64, time_constant: f64) {
        self.0
            .borrow_mut()
            .set_target_at_time(target, time, time_constant);
    }

    pub fn cancel_scheduled_values(&self, time: f64) {
        self.0.borrow_mut().cancel_scheduled_values(time);
    }

    /// Copy of the scheduled events.
    pub fn events(&self) -> Vec<AutomationEvent> {
        self.0.borrow().events().to_vec()
    }

    /// Hold the value reached at `time` and drop everything after it.
    pub fn hold_at(&self, time: f64) -> f64 {
        let mut automation = self.0.borrow_mut();
        let current = automation.value_at(time);
        automation.cancel_scheduled_values(time);
        automation.set_value_at_time(current, time);
        current
    }
}

impl fmt::Debug for ParamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let automation = self.0.borrow();
        f.debug_struct("ParamHandle")
            .field("value", &automation.value)
            .field("events", &automation.events.len())
            .finish()
    }
}
