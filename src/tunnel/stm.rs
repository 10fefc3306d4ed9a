//! Per-connection state machine.
//!
//! A static transition table maps `(state, event)` pairs to successor
//! states; each mode owns a linear chain with terminal DONE/FAIL
//! states. Lookups that miss the table leave the state untouched.

use std::fmt;

/// Tunnel states, partitioned by operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    EncryptionReady,
    EncryptionRsaNegotiating,
    EncryptionAesNegotiating,
    EncryptionAuthenticating,
    EncryptionTransmitting,
    EncryptionDone,
    EncryptionFail,

    DecryptionReady,
    DecryptionRsaNegotiating,
    DecryptionAesNegotiating,
    DecryptionAuthenticating,
    DecryptionSocks5Handshaking,
    DecryptionSocks5Requesting,
    DecryptionTransmitting,
    DecryptionDone,
    DecryptionFail,

    TransmissionReady,
    TransmissionTransmitting,
    TransmissionDone,
    TransmissionFail,
}

impl State {
    /// Terminal states end the driving task.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            State::EncryptionDone
                | State::EncryptionFail
                | State::DecryptionDone
                | State::DecryptionFail
                | State::TransmissionDone
                | State::TransmissionFail
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::EncryptionReady => "ENCRYPTION_READY",
            State::EncryptionRsaNegotiating => "ENCRYPTION_RSA_NEGOTIATING",
            State::EncryptionAesNegotiating => "ENCRYPTION_AES_NEGOTIATING",
            State::EncryptionAuthenticating => "ENCRYPTION_AUTHENTICATING",
            State::EncryptionTransmitting => "ENCRYPTION_TRANSMITTING",
            State::EncryptionDone => "ENCRYPTION_DONE",
            State::EncryptionFail => "ENCRYPTION_FAIL",
            State::DecryptionReady => "DECRYPTION_READY",
            State::DecryptionRsaNegotiating => "DECRYPTION_RSA_NEGOTIATING",
            State::DecryptionAesNegotiating => "DECRYPTION_AES_NEGOTIATING",
            State::DecryptionAuthenticating => "DECRYPTION_AUTHENTICATING",
            State::DecryptionSocks5Handshaking => "DECRYPTION_SOCKS5_HANDSHAKING",
            State::DecryptionSocks5Requesting => "DECRYPTION_SOCKS5_REQUESTING",
            State::DecryptionTransmitting => "DECRYPTION_TRANSMITTING",
            State::DecryptionDone => "DECRYPTION_DONE",
            State::DecryptionFail => "DECRYPTION_FAIL",
            State::TransmissionReady => "TRANSMISSION_READY",
            State::TransmissionTransmitting => "TRANSMISSION_TRANSMITTING",
            State::TransmissionDone => "TRANSMISSION_DONE",
            State::TransmissionFail => "TRANSMISSION_FAIL",
        };
        f.write_str(name)
    }
}

/// Events fired by the per-mode flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Establish,
    RsaPubkeySend,
    RsaPubkeyReceive,
    RsaNegotiatingFail,
    AesKeySend,
    AesKeyReceive,
    AesNegotiatingFail,
    AuthenticatingOk,
    AuthenticatingFail,
    Socks5HandshakeOk,
    Socks5HandshakeFail,
    Socks5RequestOk,
    Socks5RequestFail,
    TransmitOk,
    TransmitFail,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Event::Establish => "ESTABLISH",
            Event::RsaPubkeySend => "RSA_PUBKEY_SEND",
            Event::RsaPubkeyReceive => "RSA_PUBKEY_RECEIVE",
            Event::RsaNegotiatingFail => "RSA_NEGOTIATING_FAIL",
            Event::AesKeySend => "AES_KEY_SEND",
            Event::AesKeyReceive => "AES_KEY_RECEIVE",
            Event::AesNegotiatingFail => "AES_NEGOTIATING_FAIL",
            Event::AuthenticatingOk => "AUTHENTICATING_OK",
            Event::AuthenticatingFail => "AUTHENTICATING_FAIL",
            Event::Socks5HandshakeOk => "SOCKS5_HANDSHAKE_OK",
            Event::Socks5HandshakeFail => "SOCKS5_HANDSHAKE_FAIL",
            Event::Socks5RequestOk => "SOCKS5_REQUEST_OK",
            Event::Socks5RequestFail => "SOCKS5_REQUEST_FAIL",
            Event::TransmitOk => "TRANSMIT_OK",
            Event::TransmitFail => "TRANSMIT_FAIL",
        };
        f.write_str(name)
    }
}

/// One row of the transition table.
pub struct Transition {
    pub from: State,
    pub event: Event,
    pub to: State,
}

const fn row(from: State, event: Event, to: State) -> Transition {
    Transition { from, event, to }
}

/// The complete transition table, all modes.
pub static TRANSITIONS: &[Transition] = &[
    // encryption mode
    row(
        State::EncryptionReady,
        Event::Establish,
        State::EncryptionRsaNegotiating,
    ),
    row(
        State::EncryptionRsaNegotiating,
        Event::RsaPubkeyReceive,
        State::EncryptionAesNegotiating,
    ),
    row(
        State::EncryptionRsaNegotiating,
        Event::RsaNegotiatingFail,
        State::EncryptionFail,
    ),
    row(
        State::EncryptionAesNegotiating,
        Event::AesKeySend,
        State::EncryptionAuthenticating,
    ),
    row(
        State::EncryptionAesNegotiating,
        Event::AesNegotiatingFail,
        State::EncryptionFail,
    ),
    row(
        State::EncryptionAuthenticating,
        Event::AuthenticatingOk,
        State::EncryptionTransmitting,
    ),
    row(
        State::EncryptionAuthenticating,
        Event::AuthenticatingFail,
        State::EncryptionFail,
    ),
    row(
        State::EncryptionTransmitting,
        Event::TransmitOk,
        State::EncryptionDone,
    ),
    row(
        State::EncryptionTransmitting,
        Event::TransmitFail,
        State::EncryptionFail,
    ),
    // decryption mode
    row(
        State::DecryptionReady,
        Event::Establish,
        State::DecryptionRsaNegotiating,
    ),
    row(
        State::DecryptionRsaNegotiating,
        Event::RsaPubkeySend,
        State::DecryptionAesNegotiating,
    ),
    row(
        State::DecryptionRsaNegotiating,
        Event::RsaNegotiatingFail,
        State::DecryptionFail,
    ),
    row(
        State::DecryptionAesNegotiating,
        Event::AesKeyReceive,
        State::DecryptionAuthenticating,
    ),
    row(
        State::DecryptionAesNegotiating,
        Event::AesNegotiatingFail,
        State::DecryptionFail,
    ),
    row(
        State::DecryptionAuthenticating,
        Event::AuthenticatingOk,
        State::DecryptionSocks5Handshaking,
    ),
    row(
        State::DecryptionAuthenticating,
        Event::AuthenticatingFail,
        State::DecryptionFail,
    ),
    row(
        State::DecryptionSocks5Handshaking,
        Event::Socks5HandshakeOk,
        State::DecryptionSocks5Requesting,
    ),
    row(
        State::DecryptionSocks5Handshaking,
        Event::Socks5HandshakeFail,
        State::DecryptionFail,
    ),
    row(
        State::DecryptionSocks5Requesting,
        Event::Socks5RequestOk,
        State::DecryptionTransmitting,
    ),
    row(
        State::DecryptionSocks5Requesting,
        Event::Socks5RequestFail,
        State::DecryptionFail,
    ),
    row(
        State::DecryptionTransmitting,
        Event::TransmitOk,
        State::DecryptionDone,
    ),
    row(
        State::DecryptionTransmitting,
        Event::TransmitFail,
        State::DecryptionFail,
    ),
    // transmission mode
    row(
        State::TransmissionReady,
        Event::Establish,
        State::TransmissionTransmitting,
    ),
    row(
        State::TransmissionTransmitting,
        Event::TransmitOk,
        State::TransmissionDone,
    ),
    row(
        State::TransmissionTransmitting,
        Event::TransmitFail,
        State::TransmissionFail,
    ),
];

/// Look up the successor of `(from, event)`, if the table defines one.
pub fn next_state(from: State, event: Event) -> Option<State> {
    TRANSITIONS
        .iter()
        .find(|t| t.from == from && t.event == event)
        .map(|t| t.to)
}
