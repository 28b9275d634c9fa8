#![no_main]

use libfuzzer_sys::fuzz_target;
use ledger_oauth::server::oauth::authorize::AuthorizationEngine;
use ledger_oauth::server::oauth::types::{AuthorizeRequest, CodeChallengeMethod, ResponseType};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // First line is the redirect URI, the rest is the state.
    let (redirect, state) = text.split_once('\n').unwrap_or((text, ""));

    for response_type in [ResponseType::Code, ResponseType::Token] {
        let req = AuthorizeRequest {
            response_type,
            client_id: "222222".into(),
            redirect_uri: redirect.into(),
            scope: String::new(),
            state: state.into(),
            code_challenge: String::new(),
            code_challenge_method: CodeChallengeMethod::Plain,
            user_id: String::new(),
            access_token_exp: None,
        };
        let _ = AuthorizationEngine::build_redirect(&req, &[("code".into(), "c".into())]);
    }
});
