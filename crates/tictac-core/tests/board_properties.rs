//! Property-based tests for board rules and session transitions
//!
//! These tests verify that cells never revert, that the winner check agrees
//! with a brute-force line scan, and that a session row only ever accepts
//! records that keep its invariants.

use proptest::prelude::*;
use tictac_core::{
    Board, Cell, GameSession, Mark, MoveRecord, SessionId, SessionStatus, Timestamp, UserId,
    BOARD_CELLS, LINES,
};

/// Generate an arbitrary cell
fn arb_cell() -> impl Strategy<Value = Cell> {
    prop_oneof![Just(None), Just(Some(Mark::X)), Just(Some(Mark::O))]
}

/// Generate an arbitrary board, not necessarily reachable in play
fn arb_board() -> impl Strategy<Value = Board> {
    prop::array::uniform9(arb_cell()).prop_map(Board::from_cells)
}

/// Generate a play order: a permutation of the nine cells
fn arb_order() -> impl Strategy<Value = Vec<usize>> {
    Just((0..BOARD_CELLS).collect::<Vec<_>>()).prop_shuffle()
}

fn playing_session() -> GameSession {
    let mut session = GameSession::new(
        SessionId::new(1),
        UserId::new(1),
        UserId::new(2),
        Timestamp::new(0),
    );
    session.transition_to(SessionStatus::Playing).unwrap();
    session
}

proptest! {
    /// Property: the winner is a mark owning a full line, and only such a mark
    #[test]
    fn winner_matches_line_scan(board in arb_board()) {
        let owners: Vec<Mark> = LINES
            .iter()
            .filter_map(|line| {
                let first = board.get(line[0]).flatten()?;
                line.iter()
                    .all(|i| board.get(*i).flatten() == Some(first))
                    .then_some(first)
            })
            .collect();

        match board.winner() {
            Some(mark) => prop_assert!(owners.contains(&mark)),
            None => prop_assert!(owners.is_empty()),
        }
    }

    /// Property: a record that clears a cell is refused and leaves the row unchanged
    #[test]
    fn cleared_cells_are_refused(current in arb_board(), next in arb_board()) {
        let mut session = playing_session();
        session.board = current;
        let before = session.clone();
        let record = MoveRecord {
            board: next,
            next_turn: Mark::O,
            status: SessionStatus::Playing,
            winner_id: None,
        };

        let result = session.apply(record, Timestamp::new(1));
        if current.cleared_cells(&next).is_empty() {
            prop_assert!(result.is_ok());
            prop_assert_eq!(session.board, next);
        } else {
            prop_assert!(result.is_err());
            prop_assert_eq!(session, before);
        }
    }

    /// Property: playing every cell in turn alternates marks and fills the board
    #[test]
    fn alternating_play_fills_board(order in arb_order()) {
        let mut session = playing_session();
        let mut turn = Mark::X;
        for (step, index) in order.into_iter().enumerate() {
            if session.status == SessionStatus::Finished {
                break;
            }
            let board = session.board.with_mark(index, turn).unwrap();
            prop_assert_eq!(board.count(Mark::X) + board.count(Mark::O), step + 1);

            let winner_id = board.winner().map(|mark| session.player_for(mark));
            let status = if winner_id.is_some() || board.is_full() {
                SessionStatus::Finished
            } else {
                SessionStatus::Playing
            };
            session
                .apply(
                    MoveRecord { board, next_turn: turn.opponent(), status, winner_id },
                    Timestamp::new(step as u64),
                )
                .unwrap();
            prop_assert_eq!(session.current_turn, turn.opponent());
            turn = turn.opponent();
        }

        prop_assert_eq!(session.status, SessionStatus::Finished);
        let x = session.board.count(Mark::X);
        let o = session.board.count(Mark::O);
        prop_assert!(x == o || x == o + 1);
        if session.winner_id.is_none() {
            prop_assert!(session.board.is_full());
        }
    }
}
