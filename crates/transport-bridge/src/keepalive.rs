/// Ping/pong bookkeeping for one connection.
///
/// Each interval tick sends a ping. If the pong for the previous ping has
/// not arrived by the next tick the link is declared dead.
#[derive(Debug, Default)]
pub struct KeepAlive {
    awaiting_pong: bool,
    pings_sent: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    SendPing,
    Dead,
}

impl KeepAlive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self) -> Beat {
        if self.awaiting_pong {
            return Beat::Dead;
        }
        self.awaiting_pong = true;
        self.pings_sent += 1;
        Beat::SendPing
    }

    pub fn on_pong(&mut self) {
        self.awaiting_pong = false;
    }

    pub fn pings_sent(&self) -> u64 {
        self.pings_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answered_pings_keep_link_alive() {
        let mut keepalive = KeepAlive::new();
        for _ in 0..3 {
            assert_eq!(keepalive.tick(), Beat::SendPing);
            keepalive.on_pong();
        }
        assert_eq!(keepalive.pings_sent(), 3);
    }

    #[test]
    fn missing_pong_within_one_interval_is_dead() {
        let mut keepalive = KeepAlive::new();
        assert_eq!(keepalive.tick(), Beat::SendPing);
        assert_eq!(keepalive.tick(), Beat::Dead);
    }
}
