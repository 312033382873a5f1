//! Clavier : raccourcis de l'hôte et conversion Winit → Servo.
//!
//! Trois combinaisons appartiennent à l'hôte et ne sont jamais transmises au
//! contenu :
//!
//! | Touche | Effet |
//! |---|---|
//! | F11 | bascule plein écran |
//! | Ctrl+Échap | sort du plein écran |
//! | Ctrl+Shift+Q | demande de quit (soumise à la politique) |
//!
//! Toutes les autres touches vont au contenu (claviers, lecteurs de codes-barres
//! émulant un clavier). Seul l'état des touches de la borne est converti
//! explicitement ; une touche inconnue arrive comme `Unidentified` avec son
//! texte intact.

use servo::{Code, Key, KeyState, KeyboardEvent, Location, Modifiers, NamedKey};
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{
    Key as WinitKey, KeyCode, KeyLocation as WinitKeyLocation, ModifiersState,
    NamedKey as WinitNamedKey, PhysicalKey,
};

use crate::controller::Event;
use crate::lifecycle::QuitOrigin;

/// Événement de session si `key` est un raccourci de l'hôte.
pub fn host_shortcut(key: &WinitKey, mods: ModifiersState) -> Option<Event> {
    match key {
        WinitKey::Named(WinitNamedKey::F11) => Some(Event::FullscreenShortcut),
        WinitKey::Named(WinitNamedKey::Escape) if mods.control_key() => {
            Some(Event::ExitFullscreenShortcut)
        }
        WinitKey::Character(c)
            if mods.control_key() && mods.shift_key() && c.eq_ignore_ascii_case("q") =>
        {
            Some(Event::QuitRequested {
                origin: QuitOrigin::Shortcut,
            })
        }
        _ => None,
    }
}

/// Convertit un `KeyEvent` Winit + état des modificateurs en `KeyboardEvent` Servo.
pub fn keyboard_event_from_winit(key_event: &KeyEvent, mods: ModifiersState) -> KeyboardEvent {
    KeyboardEvent::new_without_event(
        match key_event.state {
            ElementState::Pressed => KeyState::Down,
            ElementState::Released => KeyState::Up,
        },
        key_from_winit(&key_event.logical_key),
        code_from_winit(&key_event.physical_key),
        location_from_winit(key_event.location),
        modifiers_from_winit(mods),
        key_event.repeat,
        false,
    )
}

/// Les variantes portant le même nom des deux côtés.
macro_rules! same_named_keys {
    ($key:expr; $($name:ident),* $(,)?) => {
        match $key {
            $(WinitNamedKey::$name => Key::Named(NamedKey::$name),)*
            _ => Key::Named(NamedKey::Unidentified),
        }
    };
}

macro_rules! same_codes {
    ($code:expr; $($name:ident),* $(,)?) => {
        match $code {
            $(KeyCode::$name => Code::$name,)*
            _ => Code::Unidentified,
        }
    };
}

fn key_from_winit(logical_key: &WinitKey) -> Key {
    match logical_key {
        WinitKey::Character(text) => Key::Character(text.to_string()),
        WinitKey::Named(WinitNamedKey::Space) => Key::Character(" ".to_string()),
        WinitKey::Named(WinitNamedKey::Super) => Key::Named(NamedKey::Meta),
        WinitKey::Named(named) => same_named_keys!(named;
            Enter, Tab, Escape, Backspace, Delete, Insert,
            ArrowDown, ArrowLeft, ArrowRight, ArrowUp,
            Home, End, PageUp, PageDown,
            Shift, Control, Alt, AltGraph, CapsLock, NumLock, ScrollLock, ContextMenu,
            F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
            AudioVolumeDown, AudioVolumeUp, AudioVolumeMute,
            MediaPlayPause, MediaStop, MediaTrackNext, MediaTrackPrevious,
        ),
        WinitKey::Unidentified(_) | WinitKey::Dead(_) => Key::Named(NamedKey::Unidentified),
    }
}

fn code_from_winit(physical_key: &PhysicalKey) -> Code {
    let PhysicalKey::Code(code) = physical_key else {
        return Code::Unidentified;
    };
    match code {
        KeyCode::SuperLeft => Code::MetaLeft,
        KeyCode::SuperRight => Code::MetaRight,
        other => same_codes!(other;
            KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI, KeyJ, KeyK, KeyL, KeyM,
            KeyN, KeyO, KeyP, KeyQ, KeyR, KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,
            Digit0, Digit1, Digit2, Digit3, Digit4, Digit5, Digit6, Digit7, Digit8, Digit9,
            Numpad0, Numpad1, Numpad2, Numpad3, Numpad4, Numpad5, Numpad6, Numpad7, Numpad8,
            Numpad9, NumpadAdd, NumpadSubtract, NumpadMultiply, NumpadDivide, NumpadDecimal,
            NumpadEnter,
            Enter, Tab, Space, Escape, Backspace, Delete, Insert,
            ArrowDown, ArrowLeft, ArrowRight, ArrowUp, Home, End, PageUp, PageDown,
            ShiftLeft, ShiftRight, ControlLeft, ControlRight, AltLeft, AltRight,
            CapsLock, NumLock, ContextMenu,
            Minus, Equal, BracketLeft, BracketRight, Backslash, Semicolon, Quote,
            Backquote, Comma, Period, Slash,
            F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
        ),
    }
}

fn location_from_winit(location: WinitKeyLocation) -> Location {
    match location {
        WinitKeyLocation::Left => Location::Left,
        WinitKeyLocation::Numpad => Location::Numpad,
        WinitKeyLocation::Right => Location::Right,
        WinitKeyLocation::Standard => Location::Standard,
    }
}

fn modifiers_from_winit(mods: ModifiersState) -> Modifiers {
    let mut modifiers = Modifiers::empty();
    modifiers.set(Modifiers::CONTROL, mods.control_key());
    modifiers.set(Modifiers::SHIFT, mods.shift_key());
    modifiers.set(Modifiers::ALT, mods.alt_key());
    modifiers.set(Modifiers::META, mods.super_key());
    modifiers
}
