mod common;

use chrono::{Duration, Utc};
use common::TestDatabase;
use fleetdispatch::branches_repo::BranchesRepository;
use fleetdispatch::cars::NewCar;
use fleetdispatch::cars_repo::CarsRepository;
use fleetdispatch::db::DbPool;
use fleetdispatch::dispatch::{Dispatcher, ReservationRequest};
use fleetdispatch::distance::Distance;
use fleetdispatch::distance_repo::DistanceOracle;
use fleetdispatch::error::DispatchError;
use fleetdispatch::reservations_repo::create_conn;

async fn setup_test_db() -> TestDatabase {
    TestDatabase::new().await.expect("failed to create test database")
}

struct Fleet {
    pool: DbPool,
    boston: i64,
    new_york: i64,
    chicago: i64,
}

/// Branches `{Boston, New_York, Chicago}` with the distances from spec.md's
/// seed suite: `Boston<->New_York=300km`, `Boston<->Chicago=1000km`,
/// `New_York<->Chicago=800km`.
async fn seed_fleet(pool: DbPool) -> Fleet {
    let branches = BranchesRepository::new(pool.clone());
    let distances = DistanceOracle::new(pool.clone());

    let boston = branches.create("Boston".to_string()).await.unwrap().id;
    let new_york = branches.create("New_York".to_string()).await.unwrap().id;
    let chicago = branches.create("Chicago".to_string()).await.unwrap().id;

    for (from, to, km) in [
        (boston, new_york, 300),
        (new_york, boston, 300),
        (boston, chicago, 1000),
        (chicago, boston, 1000),
        (new_york, chicago, 800),
        (chicago, new_york, 800),
    ] {
        distances
            .insert(&Distance {
                from_branch: from,
                to_branch: to,
                distance_km: km,
            })
            .await
            .unwrap();
    }

    Fleet {
        pool,
        boston,
        new_york,
        chicago,
    }
}

async fn provision_car(pool: &DbPool, car_number: &str, home_branch_id: i64, provisioned_at: chrono::DateTime<Utc>) -> i64 {
    let cars = CarsRepository::new(pool.clone());
    let new_car = NewCar::new(car_number, "Toyota", "Corolla").unwrap();
    cars.provision(new_car, home_branch_id, provisioned_at)
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn s1_same_branch_trivial_booking() {
    let test_db = setup_test_db().await;
    let fleet = seed_fleet(test_db.pool()).await;

    let car_id = provision_car(
        &fleet.pool,
        "C123456789",
        fleet.boston,
        Utc::now() - Duration::days(1),
    )
    .await;

    let dispatcher = Dispatcher::new(fleet.pool.clone(), std::time::Duration::from_secs(5));
    let reservation = dispatcher
        .reserve_one(ReservationRequest {
            start_time: Utc::now() + Duration::minutes(10),
            duration_minutes: 400,
            pickup_city: "Boston".to_string(),
            return_city: "New_York".to_string(),
        })
        .await
        .expect("expected a reservation");

    assert_eq!(reservation.car_id, car_id);
    assert_eq!(reservation.pickup_branch_id, fleet.boston);
    assert_eq!(reservation.return_branch_id, fleet.new_york);
}

#[tokio::test]
async fn s2_insufficient_duration() {
    let test_db = setup_test_db().await;
    let fleet = seed_fleet(test_db.pool()).await;

    provision_car(&fleet.pool, "C1", fleet.boston, Utc::now() - Duration::days(1)).await;

    let dispatcher = Dispatcher::new(fleet.pool.clone(), std::time::Duration::from_secs(5));
    // transfer_time(Boston, Chicago) = 1000km / 80kmh = 12.5h = 750min, which
    // exceeds the requested 600min duration.
    let result = dispatcher
        .reserve_one(ReservationRequest {
            start_time: Utc::now() + Duration::minutes(10),
            duration_minutes: 600,
            pickup_city: "Boston".to_string(),
            return_city: "Chicago".to_string(),
        })
        .await;

    assert_eq!(result.unwrap_err(), DispatchError::InsufficientDuration);
}

#[tokio::test]
async fn s3_occupied_car_transfer_feasible() {
    let test_db = setup_test_db().await;
    let fleet = seed_fleet(test_db.pool()).await;

    let car_id = provision_car(&fleet.pool, "C1", fleet.boston, Utc::now() - Duration::days(1)).await;

    // Existing reservation ending at `t` at Boston.
    let t = Utc::now() + Duration::hours(2);
    {
        let mut conn = fleet.pool.get().unwrap();
        create_conn(
            &mut conn,
            car_id,
            t - Duration::hours(1),
            t,
            fleet.new_york,
            fleet.boston,
        )
        .unwrap();
    }

    let dispatcher = Dispatcher::new(fleet.pool.clone(), std::time::Duration::from_secs(5));
    // transfer_time(Boston, New_York) = 300km / 80kmh = 3.75h = 225min <= 4h gap.
    let reservation = dispatcher
        .reserve_one(ReservationRequest {
            start_time: t + Duration::hours(4),
            duration_minutes: 120,
            pickup_city: "New_York".to_string(),
            return_city: "Boston".to_string(),
        })
        .await
        .expect("expected C1 to be selected");

    assert_eq!(reservation.car_id, car_id);
}

#[tokio::test]
async fn s4_occupied_car_transfer_infeasible() {
    let test_db = setup_test_db().await;
    let fleet = seed_fleet(test_db.pool()).await;

    let car_id = provision_car(&fleet.pool, "C1", fleet.boston, Utc::now() - Duration::days(1)).await;

    let t = Utc::now() + Duration::hours(2);
    {
        let mut conn = fleet.pool.get().unwrap();
        create_conn(
            &mut conn,
            car_id,
            t - Duration::hours(1),
            t,
            fleet.new_york,
            fleet.boston,
        )
        .unwrap();
    }

    let dispatcher = Dispatcher::new(fleet.pool.clone(), std::time::Duration::from_secs(5));
    // Only 3h gap, but the transfer takes 3.75h: no alternative car exists.
    let result = dispatcher
        .reserve_one(ReservationRequest {
            start_time: t + Duration::hours(3),
            duration_minutes: 120,
            pickup_city: "New_York".to_string(),
            return_city: "Boston".to_string(),
        })
        .await;

    assert_eq!(result.unwrap_err(), DispatchError::NoCarAvailable);
}

#[tokio::test]
async fn s5_batch_applies_nearest_branch_rule() {
    let test_db = setup_test_db().await;
    let fleet = seed_fleet(test_db.pool()).await;

    let c1 = provision_car(&fleet.pool, "C1", fleet.boston, Utc::now() - Duration::days(1)).await;
    let c2 = provision_car(&fleet.pool, "C2", fleet.new_york, Utc::now() - Duration::days(1)).await;

    let start = Utc::now() + Duration::hours(1);
    let req = ReservationRequest {
        start_time: start,
        duration_minutes: 120,
        pickup_city: "New_York".to_string(),
        return_city: "Boston".to_string(),
    };

    let dispatcher = Dispatcher::new(fleet.pool.clone(), std::time::Duration::from_secs(5));
    let reservations = dispatcher
        .reserve_batch(vec![req.clone(), req])
        .await
        .expect("expected both requests to commit");

    assert_eq!(reservations.len(), 2);
    // C2 is already at New_York (distance 0) so it is picked first; the
    // identical second window then excludes C2 by interval overlap, leaving
    // only C1, which can still reach New_York from Boston in time.
    assert_eq!(reservations[0].car_id, c2);
    assert_eq!(reservations[1].car_id, c1);
}

#[tokio::test]
async fn s5_batch_rolls_back_entirely_when_any_request_fails() {
    let test_db = setup_test_db().await;
    let fleet = seed_fleet(test_db.pool()).await;

    provision_car(&fleet.pool, "C1", fleet.boston, Utc::now() - Duration::days(1)).await;

    let good = ReservationRequest {
        start_time: Utc::now() + Duration::hours(1),
        duration_minutes: 120,
        pickup_city: "Boston".to_string(),
        return_city: "New_York".to_string(),
    };
    let impossible = ReservationRequest {
        start_time: Utc::now() + Duration::hours(5),
        duration_minutes: 120,
        pickup_city: "Chicago".to_string(),
        return_city: "Boston".to_string(),
    };

    let dispatcher = Dispatcher::new(fleet.pool.clone(), std::time::Duration::from_secs(5));
    let result = dispatcher.reserve_batch(vec![good, impossible]).await;
    assert!(result.is_err());

    let reservations_repo = fleetdispatch::reservations_repo::ReservationsRepository::new(fleet.pool.clone());
    assert!(reservations_repo.upcoming().await.unwrap().is_empty());
}

#[tokio::test]
async fn s6_concurrent_booking_assigns_exactly_once() {
    let test_db = setup_test_db().await;
    let fleet = seed_fleet(test_db.pool()).await;

    provision_car(&fleet.pool, "C1", fleet.boston, Utc::now() - Duration::days(1)).await;

    let dispatcher_a = Dispatcher::new(fleet.pool.clone(), std::time::Duration::from_secs(5));
    let dispatcher_b = Dispatcher::new(fleet.pool.clone(), std::time::Duration::from_secs(5));

    let req = ReservationRequest {
        start_time: Utc::now() + Duration::hours(1),
        duration_minutes: 120,
        pickup_city: "Boston".to_string(),
        return_city: "New_York".to_string(),
    };

    let (a, b) = tokio::join!(
        dispatcher_a.reserve_one(req.clone()),
        dispatcher_b.reserve_one(req)
    );

    let successes = [&a, &b].into_iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one of the two concurrent requests should commit");

    let failure = if a.is_err() { a } else { b };
    let err = failure.unwrap_err();
    assert!(matches!(err, DispatchError::NoCarAvailable | DispatchError::Conflict));
}

#[tokio::test]
async fn cancel_restores_movement_log_to_prior_state() {
    let test_db = setup_test_db().await;
    let fleet = seed_fleet(test_db.pool()).await;

    let car_id = provision_car(&fleet.pool, "C1", fleet.boston, Utc::now() - Duration::days(1)).await;

    let movement_log = fleetdispatch::movement_log_repo::MovementLogRepository::new(fleet.pool.clone());
    let before_start = Utc::now() + Duration::minutes(30);
    let location_before = movement_log
        .latest_branch_before(car_id, before_start)
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(fleet.pool.clone(), std::time::Duration::from_secs(5));
    let reservation = dispatcher
        .reserve_one(ReservationRequest {
            start_time: Utc::now() + Duration::hours(1),
            duration_minutes: 120,
            pickup_city: "Boston".to_string(),
            return_city: "New_York".to_string(),
        })
        .await
        .unwrap();

    let cancelled = dispatcher.cancel(reservation.id).await.unwrap();
    assert!(cancelled);

    let location_after = movement_log
        .latest_branch_before(car_id, before_start)
        .await
        .unwrap();
    assert_eq!(location_before, location_after);

    let reservations_repo = fleetdispatch::reservations_repo::ReservationsRepository::new(fleet.pool.clone());
    assert!(reservations_repo.get_by_id(reservation.id).await.unwrap().is_none());
}

#[tokio::test]
async fn active_at_reports_reservation_only_during_its_window() {
    let test_db = setup_test_db().await;
    let fleet = seed_fleet(test_db.pool()).await;

    let car_id = provision_car(&fleet.pool, "C1", fleet.boston, Utc::now() - Duration::days(1)).await;

    let dispatcher = Dispatcher::new(fleet.pool.clone(), std::time::Duration::from_secs(5));
    let reservation = dispatcher
        .reserve_one(ReservationRequest {
            start_time: Utc::now() + Duration::hours(1),
            duration_minutes: 120,
            pickup_city: "Boston".to_string(),
            return_city: "New_York".to_string(),
        })
        .await
        .unwrap();

    let reservations_repo = fleetdispatch::reservations_repo::ReservationsRepository::new(fleet.pool.clone());

    let during = reservations_repo
        .active_at(car_id, reservation.start_time + Duration::minutes(30))
        .await
        .unwrap();
    assert_eq!(during.len(), 1);
    assert_eq!(during[0].id, reservation.id);

    let before = reservations_repo
        .active_at(car_id, reservation.start_time - Duration::minutes(1))
        .await
        .unwrap();
    assert!(before.is_empty());
}
