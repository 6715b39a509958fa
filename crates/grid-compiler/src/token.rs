use std::fmt;

/// Cell vocabulary shared with every solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Token {
    Wall = 0,
    Walkable = 1,
    Start = 2,
    Target = 3,
    /// Overlay for rendering a solved path. Never sent to a solver.
    Solution = 4,
}

impl Token {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Token::Wall),
            1 => Some(Token::Walkable),
            2 => Some(Token::Start),
            3 => Some(Token::Target),
            4 => Some(Token::Solution),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_passable(self) -> bool {
        !matches!(self, Token::Wall)
    }

    pub fn glyph(self) -> char {
        match self {
            Token::Wall => '#',
            Token::Walkable => '.',
            Token::Start => 'S',
            Token::Target => 'T',
            Token::Solution => '*',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Token::Wall => "WALL",
            Token::Walkable => "WALKABLE",
            Token::Start => "START",
            Token::Target => "TARGET",
            Token::Solution => "SOLUTION",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
