//! Deterministic offline extraction for demos and `--synthetic` runs.
//!
//! Record names depend only on the target and index; ratings and prices come
//! from an RNG seeded with the task id, so replaying the same target list
//! produces identical records.

use menuscout_core::{slugify, RawProduct, RawRestaurant};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ScraperError;
use crate::session::{RawRecord, ScrapeSession, SessionFactory};
use crate::task::ScrapeTask;

const DEFAULT_ITEMS_PER_TARGET: usize = 10;

const RESTAURANT_PREFIXES: &[&str] = &["Cantina", "Casa", "Empório", "Recanto", "Sabor", "Ponto"];
const MENU_SECTIONS: &[&str] = &["Destaques", "Pratos", "Bebidas", "Sobremesas"];
const MENU_ITEMS: &[&str] = &["Combo", "Porção", "Especial", "Tradicional", "Individual"];

#[derive(Debug, Clone, Copy)]
pub struct SyntheticSessionFactory {
    items_per_target: usize,
}

impl Default for SyntheticSessionFactory {
    fn default() -> Self {
        Self {
            items_per_target: DEFAULT_ITEMS_PER_TARGET,
        }
    }
}

impl SyntheticSessionFactory {
    #[must_use]
    pub fn new(items_per_target: usize) -> Self {
        Self { items_per_target }
    }

    fn session(self, task: &ScrapeTask) -> SyntheticSession {
        SyntheticSession {
            rng: StdRng::seed_from_u64(u64::try_from(task.id).unwrap_or_default()),
            items: self.items_per_target,
        }
    }
}

pub struct SyntheticSession {
    rng: StdRng,
    items: usize,
}

fn pick<'a>(options: &[&'a str], index: usize) -> &'a str {
    options[index % options.len()]
}

fn reais(rng: &mut StdRng, min: u32, max: u32) -> String {
    let cents = rng.random_range(min * 100..=max * 100);
    format!("R$ {},{:02}", cents / 100, cents % 100)
}

impl SyntheticSession {
    fn restaurant(&mut self, task: &ScrapeTask, index: usize) -> RawRestaurant {
        let name = format!(
            "{} {} {}",
            pick(RESTAURANT_PREFIXES, index),
            task.target_name,
            index + 1
        );
        let minutes = self.rng.random_range(20..=50);
        let rating = self.rng.random_range(30..=50);
        RawRestaurant {
            url: Some(format!(
                "{}/{}",
                task.target_url.trim_end_matches('/'),
                slugify(&name)
            )),
            name: Some(name),
            rating: Some(format!("{},{}", rating / 10, rating % 10)),
            delivery_time: Some(format!("{minutes}-{} min", minutes + 10)),
            delivery_fee: Some(reais(&mut self.rng, 0, 12)),
            distance: Some(format!("{},{} km", self.rng.random_range(0..8), self.rng.random_range(0..10))),
            ..RawRestaurant::default()
        }
    }

    fn product(&mut self, task: &ScrapeTask, index: usize) -> RawProduct {
        RawProduct {
            name: Some(format!(
                "{} {} {}",
                pick(MENU_ITEMS, index),
                task.target_name,
                index + 1
            )),
            section: Some(pick(MENU_SECTIONS, index).to_string()),
            price: Some(reais(&mut self.rng, 8, 90)),
            is_available: Some(self.rng.random_bool(0.9)),
            serves_people: Some(self.rng.random_range(1..=4)),
            ..RawProduct::default()
        }
    }
}

impl SessionFactory<RawRestaurant> for SyntheticSessionFactory {
    type Session = SyntheticSession;

    async fn open(&self, task: &ScrapeTask) -> Result<SyntheticSession, ScraperError> {
        Ok(self.session(task))
    }
}

impl SessionFactory<RawProduct> for SyntheticSessionFactory {
    type Session = SyntheticSession;

    async fn open(&self, task: &ScrapeTask) -> Result<SyntheticSession, ScraperError> {
        Ok(self.session(task))
    }
}

impl ScrapeSession<RawRestaurant> for SyntheticSession {
    async fn extract(
        &mut self,
        task: &ScrapeTask,
    ) -> Result<Vec<RawRecord<RawRestaurant>>, ScraperError> {
        Ok((0..self.items).map(|i| Ok(self.restaurant(task, i))).collect())
    }

    async fn close(self) {}
}

impl ScrapeSession<RawProduct> for SyntheticSession {
    async fn extract(
        &mut self,
        task: &ScrapeTask,
    ) -> Result<Vec<RawRecord<RawProduct>>, ScraperError> {
        Ok((0..self.items).map(|i| Ok(self.product(task, i))).collect())
    }

    async fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: usize) -> ScrapeTask {
        ScrapeTask {
            id,
            target_name: "Pizza".to_string(),
            target_url: "https://example.com/delivery/birigui-sp/pizza/".to_string(),
            city: "Birigui".to_string(),
            scope: "pizza".to_string(),
        }
    }

    async fn restaurants(factory: SyntheticSessionFactory, task: &ScrapeTask) -> Vec<RawRestaurant> {
        let mut session =
            <SyntheticSessionFactory as SessionFactory<RawRestaurant>>::open(&factory, task)
                .await
                .unwrap();
        ScrapeSession::<RawRestaurant>::extract(&mut session, task)
            .await
            .unwrap()
            .into_iter()
            .map(Result::unwrap)
            .collect()
    }

    #[tokio::test]
    async fn same_task_yields_identical_records() {
        let factory = SyntheticSessionFactory::new(5);
        let first = restaurants(factory, &task(3)).await;
        let second = restaurants(factory, &task(3)).await;

        assert_eq!(first.len(), 5);
        let a: Vec<_> = first.iter().map(|r| (&r.name, &r.rating, &r.delivery_fee)).collect();
        let b: Vec<_> = second.iter().map(|r| (&r.name, &r.rating, &r.delivery_fee)).collect();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn generated_restaurants_validate() {
        let records = restaurants(SyntheticSessionFactory::default(), &task(0)).await;
        assert_eq!(records.len(), DEFAULT_ITEMS_PER_TARGET);

        let mut keys = std::collections::HashSet::new();
        for raw in records {
            let restaurant = raw.validate("pizza", "Birigui").unwrap();
            assert!(restaurant.rating.is_some());
            assert!(restaurant
                .url
                .as_deref()
                .unwrap()
                .starts_with("https://example.com/delivery/birigui-sp/pizza/"));
            assert!(keys.insert(restaurant.unique_key));
        }
    }

    #[tokio::test]
    async fn generated_products_validate() {
        let factory = SyntheticSessionFactory::new(8);
        let task = task(1);
        let mut session = <SyntheticSessionFactory as SessionFactory<RawProduct>>::open(&factory, &task)
            .await
            .unwrap();
        let records = ScrapeSession::<RawProduct>::extract(&mut session, &task)
            .await
            .unwrap();

        assert_eq!(records.len(), 8);
        for raw in records {
            let product = raw.unwrap().validate("restaurant-key").unwrap();
            assert!(product.price.is_some());
            assert!(MENU_SECTIONS.contains(&product.section.as_str()));
        }
    }
}
