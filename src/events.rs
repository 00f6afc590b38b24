use std::fmt;

/// What a GPIO line is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinRole {
    ButtonPrev,
    ButtonNext,
    ButtonJump,
    ButtonToggle,
    LedIndicator,
}

/// Buttons in `GPIO_BUTTON1..4` order.
pub const BUTTON_ROLES: [PinRole; 4] = [
    PinRole::ButtonPrev,
    PinRole::ButtonNext,
    PinRole::ButtonJump,
    PinRole::ButtonToggle,
];

impl PinRole {
    pub fn tag(self) -> &'static str {
        match self {
            Self::ButtonPrev => "button-prev",
            Self::ButtonNext => "button-next",
            Self::ButtonJump => "button-jump",
            Self::ButtonToggle => "button-toggle",
            Self::LedIndicator => "led-indicator",
        }
    }
}

impl fmt::Display for PinRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageChange {
    pub from: u32,
    pub to: u32,
}
