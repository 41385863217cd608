use signup_core::form::state::{RegisterEffect, RegisterEvent, RegisterState, reduce};

pub fn run() {
    let (_, effects) = reduce(RegisterState::new(), RegisterEvent::AppleSignInPressed);
    for effect in effects {
        if let RegisterEffect::ShowAlert(alert) = effect {
            println!("{}: {}", alert.title, alert.message);
        }
    }
}
