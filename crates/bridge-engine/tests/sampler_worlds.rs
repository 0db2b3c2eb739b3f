//! Determinization under seat constraints, at volume.

use bridge_core::game::GameState;
use bridge_core::model::constraints::Range;
use bridge_core::model::contract::Contract;
use bridge_core::model::player::Seat;
use bridge_core::model::suit::Suit;
use bridge_core::pbn::parse_deal;
use bridge_engine::Sampler;
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[test]
fn accepted_worlds_satisfy_strong_north_constraints() {
    // All four hands hidden; North is required to hold a strong hand
    // with long spades.
    let deal = parse_deal("N:... ... ... ...").unwrap();
    let mut game = GameState::new(&deal, Seat::South, Contract::parse("4S").unwrap()).unwrap();
    game.constraints_mut(Seat::North).set_hcp(Range::new(20, 37));
    game.constraints_mut(Seat::North)
        .set_suit(Suit::Spades, Range::new(5, 13));

    let sampler = Sampler::new(&game);
    let mut rng = SmallRng::seed_from_u64(20_26);

    let mut accepted = 0usize;
    let total = 10_000usize;
    for _ in 0..total {
        let world = sampler.generate(&mut rng);
        if !sampler.filter(&world) {
            continue;
        }
        accepted += 1;
        let north = world.hand(Seat::North);
        assert!(north.hcp() >= 20, "accepted world with {} HCP", north.hcp());
        assert!(
            north.suit_len(Suit::Spades) >= 5,
            "accepted world with {} spades",
            north.suit_len(Suit::Spades)
        );
        for seat in Seat::LOOP {
            assert_eq!(world.hand(seat).len(), 13);
        }
    }

    assert!(accepted > 0, "satisfiable constraints never accepted");
    assert!(accepted < total, "constraints never rejected anything");
}
