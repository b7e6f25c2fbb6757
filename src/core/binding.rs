/// Command binding — converting script calls into deferred actions.
///
/// A handler of arity 0 through 4 is wrapped so that, when the script
/// engine invokes the command, its arguments are converted immediately and
/// the handler call itself is captured as a [`DeferredAction`].
use std::rc::Rc;
use std::time::Duration;

use crate::core::channel::DeferredAction;
use crate::schema::script::ScriptValue;

/// Conversion from a raw script argument.
///
/// Missing or malformed arguments never fail the call: they are replaced by
/// `Default::default()` and logged.
pub trait FromScriptValue: Sized + Default {
    fn from_script_value(value: &ScriptValue) -> Option<Self>;

    fn from_script_arg(command: &str, index: usize, value: Option<&ScriptValue>) -> Self {
        match value {
            Some(value) => Self::from_script_value(value).unwrap_or_else(|| {
                log::warn!(
                    "command '{}': argument {} ({:?}) is malformed, using default",
                    command,
                    index,
                    value
                );
                Self::default()
            }),
            None => {
                log::warn!(
                    "command '{}': argument {} is missing, using default",
                    command,
                    index
                );
                Self::default()
            }
        }
    }
}

impl FromScriptValue for String {
    fn from_script_value(value: &ScriptValue) -> Option<Self> {
        Some(match value {
            ScriptValue::String(s) => s.clone(),
            ScriptValue::Float(f) => f.to_string(),
            ScriptValue::Int(i) => i.to_string(),
            ScriptValue::Bool(b) => b.to_string(),
        })
    }
}

impl FromScriptValue for f32 {
    fn from_script_value(value: &ScriptValue) -> Option<Self> {
        match value {
            ScriptValue::Float(f) => Some(*f),
            ScriptValue::Int(i) => Some(*i as f32),
            ScriptValue::String(s) => s.trim().parse().ok(),
            ScriptValue::Bool(_) => None,
        }
    }
}

impl FromScriptValue for i32 {
    fn from_script_value(value: &ScriptValue) -> Option<Self> {
        match value {
            ScriptValue::Int(i) => Some(*i),
            ScriptValue::Float(f) if f.fract() == 0.0 => Some(*f as i32),
            ScriptValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromScriptValue for bool {
    fn from_script_value(value: &ScriptValue) -> Option<Self> {
        match value {
            ScriptValue::Bool(b) => Some(*b),
            ScriptValue::Int(i) => Some(*i != 0),
            ScriptValue::String(s) => s.trim().parse().ok(),
            ScriptValue::Float(_) => None,
        }
    }
}

/// Script durations are seconds; negative or non-finite values become zero.
pub fn duration_from_seconds(seconds: f32) -> Duration {
    Duration::try_from_secs_f32(seconds).unwrap_or_else(|_| {
        log::warn!("invalid duration {} seconds, using zero", seconds);
        Duration::ZERO
    })
}

/// A command handler taking `Args` converted from script values.
///
/// Implemented for `Fn` closures of up to four arguments whose types
/// implement [`FromScriptValue`].
pub trait CommandHandler<Args>: 'static {
    /// Convert `args` now and return the handler call as a deferred action.
    fn capture(handler: &Rc<Self>, command: &str, args: &[ScriptValue]) -> DeferredAction;
}

macro_rules! impl_command_handler {
    ($($ty:ident: $index:tt),*) => {
        impl<F, $($ty,)*> CommandHandler<($($ty,)*)> for F
        where
            F: Fn($($ty),*) + 'static,
            $($ty: FromScriptValue + 'static,)*
        {
            #[allow(non_snake_case, unused_variables)]
            fn capture(handler: &Rc<Self>, command: &str, args: &[ScriptValue]) -> DeferredAction {
                $(let $ty = <$ty as FromScriptValue>::from_script_arg(command, $index, args.get($index));)*
                let handler = Rc::clone(handler);
                Box::new(move || (*handler)($($ty),*))
            }
        }
    };
}

impl_command_handler!();
impl_command_handler!(A1: 0);
impl_command_handler!(A1: 0, A2: 1);
impl_command_handler!(A1: 0, A2: 1, A3: 2);
impl_command_handler!(A1: 0, A2: 1, A3: 2, A4: 3);
