use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;
use tracing::info;

use crate::branches_repo::BranchesRepository;
use crate::cars::NewCar;
use crate::cars_repo::CarsRepository;
use crate::db::DbPool;
use crate::distance::Distance;
use crate::distance_repo::DistanceOracle;

/// Out-of-core fleet administration (spec.md §3: branches, cars, and
/// distances are populated outside the dispatch path). Not a general admin
/// API — there is no HTTP surface for any of this.
#[derive(Subcommand, Debug)]
pub enum SeedCommand {
    /// Create a branch.
    Branch {
        /// City name, must be unique.
        city: String,
    },
    /// Provision a car at a home branch.
    Car {
        car_number: String,
        make: String,
        model: String,
        /// City of the branch the car starts at.
        home_city: String,
    },
    /// Record the distance (in km) between two branches.
    Distance {
        from_city: String,
        to_city: String,
        distance_km: i32,
    },
}

pub async fn handle_seed(pool: DbPool, command: SeedCommand) -> Result<()> {
    let branches = BranchesRepository::new(pool.clone());

    match command {
        SeedCommand::Branch { city } => {
            let branch = branches.create(city).await?;
            info!(branch_id = branch.id, city = %branch.city, "branch created");
        }
        SeedCommand::Car {
            car_number,
            make,
            model,
            home_city,
        } => {
            let home_branch = branches
                .get_by_city(home_city.clone())
                .await?
                .ok_or_else(|| anyhow::anyhow!("unknown branch: {home_city}"))?;

            let new_car = NewCar::new(car_number, make, model)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;

            let cars = CarsRepository::new(pool);
            let car = cars.provision(new_car, home_branch.id, Utc::now()).await?;
            info!(car_id = car.id, car_number = %car.car_number, branch_id = home_branch.id, "car provisioned");
        }
        SeedCommand::Distance {
            from_city,
            to_city,
            distance_km,
        } => {
            let from = branches
                .get_by_city(from_city.clone())
                .await?
                .ok_or_else(|| anyhow::anyhow!("unknown branch: {from_city}"))?;
            let to = branches
                .get_by_city(to_city.clone())
                .await?
                .ok_or_else(|| anyhow::anyhow!("unknown branch: {to_city}"))?;

            let distances = DistanceOracle::new(pool);
            distances
                .insert(&Distance {
                    from_branch: from.id,
                    to_branch: to.id,
                    distance_km,
                })
                .await?;
            info!(from = %from.city, to = %to.city, distance_km, "distance recorded");
        }
    }

    Ok(())
}
