//! Property and concurrency tests through the coordinator facade

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use tictac_core::{Board, Mark, SessionStatus, UserId};
use tictac_runtime::{GameError, Identity, MoveRequest, RuntimeBuilder, SessionCoordinator, UserSeed};

const ALICE: &str = "alice-token";
const BOB: &str = "bob-token";

async fn coordinator(extra_users: u64) -> Arc<SessionCoordinator> {
    let mut builder = RuntimeBuilder::new()
        .with_user(UserSeed::new(Identity::new(UserId::new(1), "alice"), ALICE))
        .with_user(UserSeed::new(Identity::new(UserId::new(2), "bob"), BOB));
    for n in 0..extra_users {
        let id = 100 + n;
        builder = builder.with_user(UserSeed::new(
            Identity::new(UserId::new(id), format!("guest{}", id)),
            format!("guest-token-{}", id),
        ));
    }
    builder.build().await.unwrap().coordinator()
}

#[tokio::test]
async fn test_concurrent_challenges_get_distinct_ids() {
    let coordinator = coordinator(16).await;
    let attempts = (0..16u64).map(|n| {
        let coordinator = coordinator.clone();
        async move {
            let token = format!("guest-token-{}", 100 + n);
            coordinator.challenge(&token, UserId::new(1)).await
        }
    });
    let results = futures::future::join_all(attempts).await;

    let ids: HashSet<_> = results
        .into_iter()
        .map(|result| result.unwrap().id)
        .collect();
    assert_eq!(ids.len(), 16);
    assert_eq!(coordinator.list_my_sessions(ALICE).await.unwrap().len(), 16);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn full_games_never_clear_cells(
        order in Just((0..9usize).collect::<Vec<_>>()).prop_shuffle(),
        tamper_at in 1..8usize,
    ) {
        tokio_test::block_on(async {
            let coordinator = coordinator(0).await;
            let session = coordinator.challenge(ALICE, UserId::new(2)).await.unwrap();
            coordinator.accept_challenge(BOB, session.id).await.unwrap();

            let mut board = Board::empty();
            let mut mark = Mark::X;
            for (step, cell) in order.iter().copied().enumerate() {
                let token = if mark == Mark::X { ALICE } else { BOB };

                if step == tamper_at {
                    // Erase an earlier mark while placing the new one
                    let mut cells = *board.with_mark(cell, mark).unwrap().cells();
                    cells[order[0]] = None;
                    let refused = coordinator
                        .submit_move(token, session.id, MoveRequest {
                            board: Board::from_cells(cells),
                            next_turn: mark.opponent(),
                            winner_id: None,
                        })
                        .await;
                    assert!(matches!(refused, Err(GameError::InvalidMove { .. })));
                    let stored = coordinator.get_session(BOB, session.id).await.unwrap();
                    assert_eq!(stored.session.board, board);
                }

                board = board.with_mark(cell, mark).unwrap();
                let moved = coordinator
                    .submit_move(token, session.id, MoveRequest {
                        board,
                        next_turn: mark.opponent(),
                        winner_id: None,
                    })
                    .await
                    .unwrap();
                assert_eq!(moved.board, board);
                mark = mark.opponent();
            }

            let finished = coordinator.get_session(ALICE, session.id).await.unwrap();
            assert_eq!(finished.session.status, SessionStatus::Finished);
            assert_eq!(finished.session.winner_id, None);
            assert_eq!(coordinator.get_my_stats(ALICE).await.unwrap().draws, 1);
            assert_eq!(coordinator.get_my_stats(BOB).await.unwrap().draws, 1);
        });
    }
}
