//! # MXRC Control Core
//!
//! The control core of a general-purpose industrial robot runtime,
//! configured for a pallet-shuttle workload: the subsystems that decide
//! what the machine does next, enforce its operating mode, react to
//! faults within a bounded time, and record every action to a
//! replayable log.
//!
//! - [`arbiter`] - priority-preemptive dispatcher driving the
//!   control-mode state machine.
//! - [`queue`] - the lock-free five-level behavior queue and the
//!   mutex-protected task queue feeding it.
//! - [`alarm`] - raises, tracks, de-duplicates, and escalates faults.
//! - [`sequence`] - scripted action sequences: sequential, conditional,
//!   parallel, retry, and template-expansion semantics.
//! - [`bag`] - append-only, index-backed binary log with rotation,
//!   retention, and replay.
//! - [`trace`] - W3C trace context propagation and sampled RT-cycle
//!   tracing.
//! - [`events`] - the publish/subscribe boundary the core depends on
//!   but does not implement.
//!
//! Hardware field-bus drivers, robot-specific action leaves, individual
//! robot-model wrappers, and presentation layers live outside this
//! crate and are injected through [`arbiter::task::Task`],
//! [`sequence::Action`]/[`sequence::ActionFactory`], and [`events::EventBus`].

pub mod alarm;
pub mod arbiter;
pub mod bag;
pub mod control_mode;
pub mod error;
pub mod events;
pub mod priority;
pub mod queue;
pub mod sequence;
pub mod trace;

pub use alarm::{Alarm, AlarmConfig, AlarmConfiguration, AlarmEngine, AlarmSeverity, AlarmState, AlarmStats};
pub use arbiter::{BehaviorArbiter, BehaviorRequest, CriticalAlarmSource};
pub use bag::{BagReader, BagReplayer, BagWriter};
pub use control_mode::ControlMode;
pub use error::{ControlCoreError, ControlCoreResult};
pub use events::{Event, EventBus, EventSubscriber};
pub use priority::Priority;
pub use queue::{BehaviorPriorityQueue, TaskQueue};
pub use sequence::{SequenceDefinition, SequenceEngine, SequenceExecutionResult};
pub use trace::{RTCycleTracer, Span, TraceContext, Tracer, TracerProvider};
