//! Tests for #[derive(Action)] macro

use unistore::Action;

#[test]
fn test_variant_names() {
    #[derive(Action, Clone, Debug)]
    enum Nav {
        Back,
        Open(String),
        Scroll { lines: i32 },
    }

    assert_eq!(Nav::Back.name(), "Back");
    assert_eq!(Nav::Open("x".into()).name(), "Open");
    assert_eq!(Nav::Scroll { lines: 3 }.name(), "Scroll");
}

#[test]
fn test_name_override() {
    #[derive(Action, Clone, Debug)]
    enum Search {
        QueryChanged(String),
        #[action(name = "Results")]
        DidSearch { hits: Vec<String> },
    }

    assert_eq!(Search::QueryChanged(String::new()).name(), "QueryChanged");
    assert_eq!(Search::DidSearch { hits: vec![] }.name(), "Results");
}

#[test]
fn test_prefix() {
    #[derive(Action, Clone, Debug)]
    #[action(prefix = "Settings.")]
    enum Settings {
        ToggleDarkMode,
        #[action(name = "Font")]
        SetFontSize(u8),
    }

    assert_eq!(Settings::ToggleDarkMode.name(), "Settings.ToggleDarkMode");
    assert_eq!(Settings::SetFontSize(12).name(), "Settings.Font");
}

#[test]
fn test_generic_action() {
    #[derive(Action, Clone, Debug)]
    enum Loaded<T: Clone + std::fmt::Debug + Send + 'static> {
        Value(T),
        Missing,
    }

    assert_eq!(Loaded::Value(3u8).name(), "Value");
    assert_eq!(Loaded::<u8>::Missing.name(), "Missing");
}

#[test]
fn test_nested_actions_name_outer_variant() {
    #[derive(Action, Clone, Debug)]
    enum Child {
        Ping,
    }

    #[derive(Action, Clone, Debug)]
    enum Parent {
        Child(Child),
    }

    assert_eq!(Parent::Child(Child::Ping).name(), "Child");
    assert_eq!(Child::Ping.name(), "Ping");
}
