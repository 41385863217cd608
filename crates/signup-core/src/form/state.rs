//! Registration screen state and reducer.
//!
//! `reduce` is pure: it consumes the current state and an event, and returns
//! the next state plus the effects the runtime must execute. Network calls
//! only ever happen by executing a returned effect.

use super::{Field, RegistrationInput, ValidationErrors, validate};
use crate::backend::{BackendError, RegisterError, RegistrationRequest};
use crate::oauth::SignInError;

/// User-visible alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: &'static str,
    pub message: String,
}

impl Alert {
    fn new(title: &'static str, message: impl Into<String>) -> Self {
        Self {
            title,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }
}

#[derive(Debug, Clone)]
pub enum RegisterEvent {
    FieldChanged { field: Field, value: String },
    FocusChanged(Option<Field>),
    SubmitPressed,
    SubmitFinished(Result<(), RegisterError>),
    GoogleSignInPressed,
    GoogleSignInFinished(Result<(), SignInError>),
    AppleSignInPressed,
}

/// Effects returned by the reducer for the runtime to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterEffect {
    /// POST the registration; answer with `SubmitFinished`.
    SubmitRegistration(RegistrationRequest),
    /// Run one Google sign-in attempt; answer with `GoogleSignInFinished`.
    StartGoogleSignIn,
    ShowAlert(Alert),
}

/// Local state of the registration screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterState {
    pub input: RegistrationInput,
    pub errors: ValidationErrors,
    pub focused: Option<Field>,
    /// A request is in flight; every action control is disabled.
    pub loading: bool,
}

impl RegisterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label of the primary button.
    pub fn submit_label(&self) -> &'static str {
        if self.loading {
            "Creating Account..."
        } else {
            "Continue"
        }
    }

    pub fn is_focused(&self, field: Field) -> bool {
        self.focused == Some(field)
    }

    pub fn can_edit(&self) -> bool {
        !self.loading
    }
}

pub fn reduce(mut state: RegisterState, event: RegisterEvent) -> (RegisterState, Vec<RegisterEffect>) {
    let effects = match event {
        RegisterEvent::FieldChanged { field, value } => {
            state.input.set(field, value);
            state.errors.clear(field);
            vec![]
        }
        RegisterEvent::FocusChanged(field) => {
            state.focused = field;
            vec![]
        }
        RegisterEvent::SubmitPressed => handle_submit(&mut state),
        RegisterEvent::SubmitFinished(result) => {
            state.loading = false;
            handle_submit_result(&mut state, result)
        }
        RegisterEvent::GoogleSignInPressed => {
            if state.loading {
                vec![]
            } else {
                state.loading = true;
                vec![RegisterEffect::StartGoogleSignIn]
            }
        }
        RegisterEvent::GoogleSignInFinished(result) => {
            state.loading = false;
            google_alert(&result)
                .map(RegisterEffect::ShowAlert)
                .into_iter()
                .collect()
        }
        RegisterEvent::AppleSignInPressed => vec![RegisterEffect::ShowAlert(Alert::new(
            "Coming Soon",
            "Apple Sign In will be available soon!",
        ))],
    };
    (state, effects)
}

fn handle_submit(state: &mut RegisterState) -> Vec<RegisterEffect> {
    if state.loading {
        return vec![];
    }

    state.errors = validate(&state.input);
    if !state.errors.is_empty() {
        return vec![];
    }

    state.loading = true;
    vec![RegisterEffect::SubmitRegistration(
        RegistrationRequest::from_input(&state.input),
    )]
}

fn handle_submit_result(
    state: &mut RegisterState,
    result: Result<(), RegisterError>,
) -> Vec<RegisterEffect> {
    let alert = match result {
        Ok(()) => Alert::new("Success", "Your account has been created successfully!"),
        Err(RegisterError::DuplicateEmail(message)) => {
            state.errors = ValidationErrors::single(Field::Email, message);
            return vec![];
        }
        Err(RegisterError::Rejected { message, .. }) => Alert::error(message),
        Err(RegisterError::Network(_)) => Alert::error("Network error. Please try again."),
    };
    vec![RegisterEffect::ShowAlert(alert)]
}

fn google_alert(result: &Result<(), SignInError>) -> Option<Alert> {
    match result {
        Ok(()) => Some(Alert::new("Success", "Logged in with Google!")),
        Err(SignInError::Cancelled) => None,
        Err(SignInError::Backend(BackendError::Rejected(_))) => {
            Some(Alert::error("Google sign-in failed"))
        }
        Err(_) => Some(Alert::error("Google sign-in failed. Please try again.")),
    }
}
