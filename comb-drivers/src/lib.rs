//! Driver layer between the harvest controller and the remote browser.
//!
//! Nothing in here decides *what* to do next; it only observes the page and
//! performs single actions on it.
//!
//! - [`page::probe::PageProbe`]: read-only DOM probes over the script-execution channel
//! - [`page::scripts`]: the versioned probe-script library
//! - [`page::geometry`]: focus-point geometry
//! - [`input::gateway::SystemInputGateway`]: OS-level hover/click/wheel with safety checks
//! - [`input::socket::SocketChannel`]: socket fallback for wheel events
//! - [`behavioral::BehavioralEngine`]: seedable human-like pacing
pub mod behavioral;
pub mod command;
pub mod input;
pub mod page;
