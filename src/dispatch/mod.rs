//! # Dispatch Facade
//!
//! The entry point call sites use instead of a direct method call.
//!
//! ```text
//! Dispatcher::invoke(value, Record, winningPercent, [])
//!   → Resolver::resolve            (override / conditional / default)
//!   → check arguments
//!   → body(&Receiver, args)        (nested calls go back through dispatch)
//!   → check result
//! ```
//!
//! Resolution failures and body errors are returned unchanged.

pub mod config;
pub mod error;
pub mod receiver;

use std::sync::Arc;

use serde_json::Value;

use crate::capabilities::{CapabilityId, CapabilityRegistry, MemberSignature, ValueKind};
use crate::hooks::DispatchHook;
use crate::resolver::{ExtensionContext, ResolutionError, ResolutionResult, Resolver};
use crate::values::ValueDescriptor;

pub use config::DispatchConfig;
pub use error::DispatchError;
pub use receiver::Receiver;

/// Where a call is resolved.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Target {
    /// Full resolution on a capability the value holds.
    Capability(CapabilityId),
    /// Static resolution inside an extension block.
    Extension(ExtensionContext),
}

/// Resolves and executes capability members.
pub struct Dispatcher {
    /// Registry shared with every other dispatcher
    registry: Arc<CapabilityRegistry>,

    /// Limits and checks
    config: DispatchConfig,

    /// Observers notified of every dispatch
    hooks: Vec<Arc<dyn DispatchHook>>,
}

impl Dispatcher {
    /// Create a dispatcher with the default configuration.
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self::with_config(registry, DispatchConfig::default())
    }

    /// Create a dispatcher with an explicit configuration.
    pub fn with_config(registry: Arc<CapabilityRegistry>, config: DispatchConfig) -> Self {
        if !registry.is_frozen() {
            log::warn!("Dispatcher created over an unfrozen capability registry");
        }
        Self {
            registry,
            config,
            hooks: Vec::new(),
        }
    }

    /// Register an observer.
    pub fn add_hook(&mut self, hook: Arc<dyn DispatchHook>) {
        self.hooks.push(hook);
    }

    /// The registry this dispatcher resolves against.
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// The active configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Resolve a member without executing it.
    pub fn resolve(
        &self,
        value: &ValueDescriptor,
        capability: CapabilityId,
        signature: &MemberSignature,
    ) -> ResolutionResult {
        Resolver::new(&self.registry, value).resolve(capability, signature)
    }

    /// Resolve and execute a member.
    pub fn invoke(
        &self,
        value: &ValueDescriptor,
        capability: CapabilityId,
        signature: &MemberSignature,
        args: &[Value],
    ) -> Result<Value, DispatchError> {
        self.dispatch(value, Target::Capability(capability), signature, args, 0)
    }

    /// Resolve and execute a member looked up by name and argument count.
    pub fn invoke_named(
        &self,
        value: &ValueDescriptor,
        capability: CapabilityId,
        name: &str,
        args: &[Value],
    ) -> Result<Value, DispatchError> {
        let signature = self.named_signature(value, capability, name, args.len())?;
        self.invoke(value, capability, &signature, args)
    }

    /// View the value as `capability` (a conditional downcast).
    pub fn cast<'a>(
        &'a self,
        value: &'a ValueDescriptor,
        capability: CapabilityId,
    ) -> Result<CapabilityView<'a>, ResolutionError> {
        if self.registry.lookup(capability).is_none() || !value.has_capability(capability) {
            return Err(self.no_such_capability(value, capability));
        }
        Ok(CapabilityView {
            dispatcher: self,
            value,
            capability,
        })
    }

    /// Whether the value conforms to every capability (`A & B`).
    pub fn conforms_to_all(&self, value: &ValueDescriptor, capabilities: &[CapabilityId]) -> bool {
        value.conforms_to_all(capabilities)
    }

    pub(crate) fn named_signature(
        &self,
        value: &ValueDescriptor,
        capability: CapabilityId,
        name: &str,
        arity: usize,
    ) -> Result<MemberSignature, ResolutionError> {
        if self.registry.lookup(capability).is_none() || !value.has_capability(capability) {
            return Err(self.no_such_capability(value, capability));
        }
        self.registry
            .member_named(capability, name, arity)
            .cloned()
            .ok_or_else(|| ResolutionError::NoSuchMember {
                capability: self.registry.name_of(capability),
                member: format!("{}/{}", name, arity),
            })
    }

    pub(crate) fn dispatch(
        &self,
        value: &ValueDescriptor,
        target: Target,
        signature: &MemberSignature,
        args: &[Value],
        depth: usize,
    ) -> Result<Value, DispatchError> {
        if depth >= self.config.max_call_depth {
            return Err(DispatchError::RecursionLimit {
                member: signature.to_string(),
                limit: self.config.max_call_depth,
            });
        }

        let resolver = Resolver::new(&self.registry, value);
        let resolved = match target {
            Target::Capability(capability) => resolver.resolve(capability, signature),
            Target::Extension(context) => resolver.resolve_in(context, signature),
        };
        let binding = match resolved {
            Ok(binding) => binding,
            Err(err) => {
                let capability = match target {
                    Target::Capability(capability) => Some(capability),
                    Target::Extension(_) => None,
                };
                for hook in &self.hooks {
                    hook.on_unresolved(value, capability, signature, &err);
                }
                return Err(err.into());
            }
        };
        for hook in &self.hooks {
            hook.on_resolved(value, &binding);
        }

        if self.config.check_arguments {
            check_arguments(signature, args)?;
        }

        let receiver = Receiver::new(self, value, binding.capability, binding.scope(), depth + 1);
        let result = (binding.body)(&receiver, args).and_then(|returned| {
            if self.config.check_returns && !signature.returns.matches(&returned) {
                return Err(DispatchError::ReturnMismatch {
                    member: signature.to_string(),
                    expected: signature.returns,
                    found: ValueKind::of(&returned),
                });
            }
            Ok(returned)
        });

        for hook in &self.hooks {
            hook.after_invoke(value, &binding, &result);
        }
        result
    }

    fn no_such_capability(&self, value: &ValueDescriptor, capability: CapabilityId) -> ResolutionError {
        ResolutionError::NoSuchCapability {
            type_name: value.type_name().to_string(),
            capability: self.registry.name_of(capability),
        }
    }
}

fn check_arguments(signature: &MemberSignature, args: &[Value]) -> Result<(), DispatchError> {
    if args.len() != signature.arity() {
        return Err(DispatchError::ArgumentMismatch {
            member: signature.to_string(),
            reason: format!("expected {} arguments, got {}", signature.arity(), args.len()),
        });
    }
    for (i, (kind, arg)) in signature.params.iter().zip(args).enumerate() {
        if !kind.matches(arg) {
            return Err(DispatchError::ArgumentMismatch {
                member: signature.to_string(),
                reason: format!("argument {} expected {}, got {}", i, kind, ValueKind::of(arg)),
            });
        }
    }
    Ok(())
}

/// A value seen through one of its capabilities (the result of `as?`).
pub struct CapabilityView<'a> {
    dispatcher: &'a Dispatcher,
    value: &'a ValueDescriptor,
    capability: CapabilityId,
}

impl<'a> CapabilityView<'a> {
    pub fn capability(&self) -> CapabilityId {
        self.capability
    }

    pub fn value(&self) -> &'a ValueDescriptor {
        self.value
    }

    /// Invoke a member of the viewed capability by name.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value, DispatchError> {
        self.dispatcher
            .invoke_named(self.value, self.capability, name, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::body;
    use crate::resolver::{Binding, BindingSource};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn int(name: &str) -> MemberSignature {
        MemberSignature::getter(name, ValueKind::Int)
    }

    fn float(name: &str) -> MemberSignature {
        MemberSignature::getter(name, ValueKind::Float)
    }

    struct Sports {
        registry: Arc<CapabilityRegistry>,
        record: CapabilityId,
        tieable: CapabilityId,
        prizable: CapabilityId,
        describable: CapabilityId,
    }

    /// Record / Tieable / Prizable with the sports-record extensions.
    fn sports(conditional_percent: bool) -> Sports {
        let mut registry = CapabilityRegistry::new();
        let describable = registry
            .declare_capability(
                "Describable",
                vec![MemberSignature::getter("description", ValueKind::String)],
            )
            .unwrap();
        let record = registry
            .declare_refining(
                "Record",
                &[describable],
                vec![int("wins"), int("losses"), float("winningPercent")],
            )
            .unwrap();
        let tieable = registry.declare_capability("Tieable", vec![int("ties")]).unwrap();
        let prizable = registry
            .declare_capability(
                "Prizable",
                vec![MemberSignature::getter("isPrizable", ValueKind::Bool)],
            )
            .unwrap();

        // extension Record
        registry
            .extend(
                record,
                int("gamePlayed"),
                body(|r, _| Ok(json!(r.call_i64("wins")? + r.call_i64("losses")?))),
            )
            .unwrap();
        registry
            .provide_default(
                record,
                float("winningPercent"),
                body(|r, _| Ok(json!(r.call_f64("wins")? / r.call_f64("gamePlayed")?))),
            )
            .unwrap();
        registry
            .provide_default(
                record,
                MemberSignature::getter("description", ValueKind::String),
                body(|r, _| {
                    Ok(json!(format!(
                        "WINS: {}, LOSSES: {}",
                        r.call_i64("wins")?,
                        r.call_i64("losses")?
                    )))
                }),
            )
            .unwrap();

        // extension Record where Self: Tieable
        registry
            .provide_conditional_default(
                record,
                tieable,
                int("gamePlayed"),
                body(|r, _| {
                    Ok(json!(
                        r.call_i64("wins")? + r.call_i64("losses")? + r.call_i64("ties")?
                    ))
                }),
            )
            .unwrap();
        if conditional_percent {
            registry
                .provide_conditional_default(
                    record,
                    tieable,
                    float("winningPercent"),
                    body(|r, _| Ok(json!(r.call_f64("wins")? / r.call_f64("gamePlayed")?))),
                )
                .unwrap();
        }

        registry.freeze();
        Sports {
            registry: Arc::new(registry),
            record,
            tieable,
            prizable,
            describable,
        }
    }

    fn team(s: &Sports, wins: i64, losses: i64) -> ValueDescriptor {
        ValueDescriptor::builder("BaseballRecord")
            .state(json!({"wins": wins, "losses": losses}))
            .conforms_to(s.record)
            .stored(s.record, int("wins"))
            .stored(s.record, int("losses"))
            .build(&s.registry)
            .unwrap()
    }

    fn football(s: &Sports, wins: i64, losses: i64, ties: i64) -> ValueDescriptor {
        ValueDescriptor::builder("FootballRecord")
            .state(json!({"wins": wins, "losses": losses, "ties": ties}))
            .conforms_to(s.record)
            .conforms_to(s.tieable)
            .stored(s.record, int("wins"))
            .stored(s.record, int("losses"))
            .stored(s.tieable, int("ties"))
            .build(&s.registry)
            .unwrap()
    }

    fn percent(dispatcher: &Dispatcher, s: &Sports, value: &ValueDescriptor) -> f64 {
        dispatcher
            .invoke(value, s.record, &float("winningPercent"), &[])
            .unwrap()
            .as_f64()
            .unwrap()
    }

    #[test]
    fn test_unconditional_default_scenario() {
        init_logging();
        let s = sports(true);
        let dispatcher = Dispatcher::new(s.registry.clone());
        let a = team(&s, 10, 5);
        assert!((percent(&dispatcher, &s, &a) - 0.667).abs() < 1e-3);
    }

    #[test]
    fn test_conditional_default_scenario() {
        init_logging();
        let s = sports(true);
        let dispatcher = Dispatcher::new(s.registry.clone());
        let b = football(&s, 1, 1, 1);
        assert!((percent(&dispatcher, &s, &b) - 0.333).abs() < 1e-3);
        assert_eq!(
            dispatcher.invoke_named(&b, s.record, "gamePlayed", &[]).unwrap(),
            json!(3)
        );
    }

    #[test]
    fn test_default_calls_resolve_in_their_extension() {
        // Without a conditional winningPercent, the unconditional default's
        // call to gamePlayed stays in `extension Record`.
        let s = sports(false);
        let dispatcher = Dispatcher::new(s.registry.clone());
        let b = football(&s, 1, 1, 1);
        assert!((percent(&dispatcher, &s, &b) - 0.5).abs() < 1e-9);
        // A direct call still picks the conditional gamePlayed.
        assert_eq!(
            dispatcher.invoke_named(&b, s.record, "gamePlayed", &[]).unwrap(),
            json!(3)
        );
    }

    #[test]
    fn test_conditional_block_sees_companion_members() {
        let mut registry = CapabilityRegistry::new();
        let record = registry.declare_capability("Record", vec![int("wins")]).unwrap();
        let tieable = registry.declare_capability("Tieable", vec![int("ties")]).unwrap();
        registry
            .extend(record, int("points"), body(|r, _| r.call("ties", &[])))
            .unwrap();
        registry
            .provide_conditional_default(
                record,
                tieable,
                int("points"),
                body(|r, _| Ok(json!(r.call_i64("wins")? * 2 + r.call_i64("ties")?))),
            )
            .unwrap();
        registry.freeze();
        let registry = Arc::new(registry);
        let dispatcher = Dispatcher::new(registry.clone());

        let tied = ValueDescriptor::builder("Tied")
            .state(json!({"wins": 3, "ties": 2}))
            .conforms_to(record)
            .conforms_to(tieable)
            .stored(record, int("wins"))
            .stored(tieable, int("ties"))
            .build(&registry)
            .unwrap();
        assert_eq!(
            dispatcher.invoke_named(&tied, record, "points", &[]).unwrap(),
            json!(8)
        );

        // The unconditional block has no companion to fall back to.
        let plain = ValueDescriptor::builder("Plain")
            .state(json!({"wins": 3}))
            .conforms_to(record)
            .stored(record, int("wins"))
            .build(&registry)
            .unwrap();
        let err = dispatcher
            .invoke_named(&plain, record, "points", &[])
            .unwrap_err();
        assert!(matches!(
            err.as_resolution(),
            Some(ResolutionError::NoSuchMember { member, .. }) if member == "ties/0"
        ));
    }

    #[test]
    fn test_override_wins_and_does_not_leak_into_extensions() {
        let s = sports(true);
        let dispatcher = Dispatcher::new(s.registry.clone());
        let c = ValueDescriptor::builder("Champion")
            .state(json!({"wins": 4, "losses": 4, "ties": 0}))
            .conforms_to(s.record)
            .conforms_to(s.tieable)
            .stored(s.record, int("wins"))
            .stored(s.record, int("losses"))
            .stored(s.tieable, int("ties"))
            .implement(s.record, float("winningPercent"), body(|_, _| Ok(json!(1.0))))
            .implement(s.record, int("gamePlayed"), body(|_, _| Ok(json!(162))))
            .build(&s.registry)
            .unwrap();

        assert_eq!(percent(&dispatcher, &s, &c), 1.0);
        assert_eq!(
            dispatcher.invoke_named(&c, s.record, "gamePlayed", &[]).unwrap(),
            json!(162)
        );
        assert_eq!(
            dispatcher
                .invoke_named(&c, s.describable, "description", &[])
                .unwrap(),
            json!("WINS: 4, LOSSES: 4")
        );

        // The default winningPercent keeps using its own block's gamePlayed.
        let d = ValueDescriptor::builder("Exhibition")
            .state(json!({"wins": 4, "losses": 4, "ties": 0}))
            .conforms_to(s.record)
            .conforms_to(s.tieable)
            .stored(s.record, int("wins"))
            .stored(s.record, int("losses"))
            .stored(s.tieable, int("ties"))
            .implement(s.record, int("gamePlayed"), body(|_, _| Ok(json!(162))))
            .build(&s.registry)
            .unwrap();
        assert!((percent(&dispatcher, &s, &d) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_concrete_bodies_dispatch_dynamically() {
        let s = sports(true);
        let dispatcher = Dispatcher::new(s.registry.clone());
        let value = ValueDescriptor::builder("BaseRecord")
            .state(json!({"wins": 10, "losses": 5}))
            .conforms_to(s.record)
            .conforms_to(s.prizable)
            .stored(s.record, int("wins"))
            .stored(s.record, int("losses"))
            .implement(
                s.prizable,
                MemberSignature::getter("isPrizable", ValueKind::Bool),
                body(|r, _| {
                    Ok(json!(
                        r.call_i64("gamePlayed")? > 10 && r.call_f64("winningPercent")? >= 0.5
                    ))
                }),
            )
            .build(&s.registry)
            .unwrap();

        assert_eq!(
            dispatcher.invoke_named(&value, s.prizable, "isPrizable", &[]).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_cast_and_composition() {
        let s = sports(true);
        let dispatcher = Dispatcher::new(s.registry.clone());
        let a = team(&s, 2, 10);
        let b = football(&s, 1, 1, 1);

        let err = dispatcher.cast(&a, s.tieable).err().unwrap();
        assert!(matches!(err, ResolutionError::NoSuchCapability { ref capability, .. } if capability == "Tieable"));

        let view = dispatcher.cast(&b, s.tieable).unwrap();
        assert_eq!(view.capability(), s.tieable);
        assert_eq!(view.invoke("ties", &[]).unwrap(), json!(1));

        // Record refines Describable, so conforming to Record is enough.
        assert!(dispatcher.conforms_to_all(&a, &[s.record, s.describable]));
        assert!(!dispatcher.conforms_to_all(&a, &[s.record, s.prizable]));
    }

    #[test]
    fn test_resolution_failures_propagate() {
        let s = sports(true);
        let dispatcher = Dispatcher::new(s.registry.clone());
        let a = team(&s, 1, 0);

        let err = dispatcher
            .invoke(&a, s.record, &int("draws"), &[])
            .unwrap_err();
        assert!(matches!(
            err.as_resolution(),
            Some(ResolutionError::NoSuchMember { .. })
        ));

        let err = dispatcher
            .invoke_named(&a, s.tieable, "ties", &[])
            .unwrap_err();
        assert!(matches!(
            err.as_resolution(),
            Some(ResolutionError::NoSuchCapability { .. })
        ));

        let err = dispatcher
            .invoke_named(&a, s.record, "wins", &[json!(1)])
            .unwrap_err();
        assert!(matches!(
            err.as_resolution(),
            Some(ResolutionError::NoSuchMember { member, .. }) if member == "wins/1"
        ));
    }

    #[test]
    fn test_body_errors_propagate_unchanged() {
        let mut registry = CapabilityRegistry::new();
        let pet = registry.declare_capability("Pet", vec![]).unwrap();
        let fed = MemberSignature::new("fed").with_params(vec![ValueKind::String]);
        registry
            .extend(
                pet,
                fed.clone(),
                body(|_, args| match args[0].as_str() {
                    Some("Bone") => Ok(json!("Eat!")),
                    _ => Err(anyhow::anyhow!("refuses food").into()),
                }),
            )
            .unwrap();
        let guard = MemberSignature::new("guard");
        registry
            .extend(
                pet,
                guard.clone(),
                body(|r, _| r.call("fed", &[json!("Grass")])),
            )
            .unwrap();
        registry.freeze();
        let dispatcher = Dispatcher::new(Arc::new(registry));
        let dog = ValueDescriptor::builder("Dog")
            .conforms_to(pet)
            .build(dispatcher.registry())
            .unwrap();

        assert_eq!(
            dispatcher.invoke(&dog, pet, &fed, &[json!("Bone")]).unwrap(),
            json!("Eat!")
        );
        let err = dispatcher.invoke(&dog, pet, &guard, &[]).unwrap_err();
        assert!(matches!(err, DispatchError::Runtime(ref e) if e.to_string() == "refuses food"));

        let err = dispatcher.invoke(&dog, pet, &fed, &[json!(3)]).unwrap_err();
        assert!(matches!(err, DispatchError::ArgumentMismatch { .. }));
        let err = dispatcher.invoke(&dog, pet, &fed, &[]).unwrap_err();
        assert!(matches!(err, DispatchError::ArgumentMismatch { .. }));
    }

    #[test]
    fn test_return_kind_is_checked() {
        let mut registry = CapabilityRegistry::new();
        let shape = registry.declare_capability("HasArea", vec![]).unwrap();
        let area = float("area");
        registry
            .extend(shape, area.clone(), body(|_, _| Ok(json!("big"))))
            .unwrap();
        registry.freeze();
        let registry = Arc::new(registry);
        let circle = ValueDescriptor::builder("Circle")
            .conforms_to(shape)
            .build(&registry)
            .unwrap();

        let strict = Dispatcher::new(registry.clone());
        let err = strict.invoke(&circle, shape, &area, &[]).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::ReturnMismatch {
                expected: ValueKind::Float,
                found: ValueKind::String,
                ..
            }
        ));

        let config = DispatchConfig::from_yaml("check_returns: false").unwrap();
        let lenient = Dispatcher::with_config(registry, config);
        assert_eq!(lenient.invoke(&circle, shape, &area, &[]).unwrap(), json!("big"));
    }

    #[test]
    fn test_recursive_defaults_hit_depth_limit() {
        let mut registry = CapabilityRegistry::new();
        let cyclic = registry.declare_capability("Cyclic", vec![]).unwrap();
        registry
            .extend(cyclic, MemberSignature::new("ping"), body(|r, _| r.call("pong", &[])))
            .unwrap();
        registry
            .extend(cyclic, MemberSignature::new("pong"), body(|r, _| r.call("ping", &[])))
            .unwrap();
        registry.freeze();
        let registry = Arc::new(registry);
        let value = ValueDescriptor::builder("Loop")
            .conforms_to(cyclic)
            .build(&registry)
            .unwrap();

        let dispatcher =
            Dispatcher::with_config(registry, DispatchConfig::default().with_max_call_depth(8));
        let err = dispatcher
            .invoke_named(&value, cyclic, "ping", &[])
            .unwrap_err();
        assert!(matches!(err, DispatchError::RecursionLimit { limit: 8, .. }));
    }

    #[derive(Default)]
    struct CountingHook {
        resolved: AtomicUsize,
        overrides: AtomicUsize,
        unresolved: AtomicUsize,
        completed: AtomicUsize,
    }

    impl DispatchHook for CountingHook {
        fn on_resolved(&self, _value: &ValueDescriptor, binding: &Binding) {
            self.resolved.fetch_add(1, Ordering::Relaxed);
            if binding.source == BindingSource::Override {
                self.overrides.fetch_add(1, Ordering::Relaxed);
            }
        }

        fn on_unresolved(
            &self,
            _value: &ValueDescriptor,
            _capability: Option<CapabilityId>,
            _signature: &MemberSignature,
            _error: &ResolutionError,
        ) {
            self.unresolved.fetch_add(1, Ordering::Relaxed);
        }

        fn after_invoke(
            &self,
            _value: &ValueDescriptor,
            _binding: &Binding,
            _result: &Result<Value, DispatchError>,
        ) {
            self.completed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_hooks_observe_nested_calls() {
        let s = sports(true);
        let mut dispatcher = Dispatcher::new(s.registry.clone());
        let hook = Arc::new(CountingHook::default());
        dispatcher.add_hook(hook.clone());

        let a = team(&s, 10, 5);
        percent(&dispatcher, &s, &a);
        // winningPercent → wins, gamePlayed → wins, losses
        assert_eq!(hook.resolved.load(Ordering::Relaxed), 5);
        assert_eq!(hook.overrides.load(Ordering::Relaxed), 3);
        assert_eq!(hook.completed.load(Ordering::Relaxed), 5);

        let _ = dispatcher.invoke(&a, s.record, &int("draws"), &[]);
        assert_eq!(hook.unresolved.load(Ordering::Relaxed), 1);
    }
}
