use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::index_list::CountedIndexList;
use crate::particles::Particle;
use crate::sim_params::SimParams;

/// CPU mirror of the GPU emit/simulate pipeline, stepping the same frame
/// sequence the command encoder records: emit, simulate, snapshot copy into
/// the staged ring, ping-pong list copy, write-counter reset. Used to test
/// the simulation protocol without a device; the shaders implement the same
/// transitions over the same counted-list operations.
pub struct ParticleSim {
    pub params: SimParams,
    particles: Vec<Particle>,
    /// [0] is the current list (emit appends, render consumes), [1] is the
    /// write list the simulate pass rebuilds each frame.
    alive: [CountedIndexList; 2],
    dead: CountedIndexList,
    staged: Vec<Vec<Particle>>,
    /// Frame number that last wrote each ring slot.
    staged_writer: Vec<Option<u64>>,
    frame: u64,
    total_time: f32,
    rng: StdRng,
}

impl ParticleSim {
    pub fn new(params: SimParams, seed: u64) -> Self {
        let n = params.max_particle_count;
        let ring = params.buffer_count as usize;
        ParticleSim {
            params,
            particles: vec![Particle::inert(); n as usize],
            alive: [
                CountedIndexList::with_capacity(n),
                CountedIndexList::with_capacity(n),
            ],
            dead: CountedIndexList::full(n),
            staged: vec![vec![Particle::inert(); n as usize]; ring],
            staged_writer: vec![None; ring],
            frame: 0,
            total_time: 0.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn alive_count(&self) -> u32 {
        self.alive[0].len()
    }

    pub fn dead_count(&self) -> u32 {
        self.dead.len()
    }

    pub fn frame_number(&self) -> u64 {
        self.frame
    }

    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    pub fn alive_indices(&self) -> Vec<u32> {
        self.alive[0].indices()
    }

    pub fn particle(&self, index: u32) -> &Particle {
        &self.particles[index as usize]
    }

    pub fn staged_snapshot(&self, slot: usize) -> &[Particle] {
        &self.staged[slot]
    }

    /// Frame that most recently wrote the given ring slot.
    pub fn staged_writer(&self, slot: usize) -> Option<u64> {
        self.staged_writer[slot]
    }

    fn sample(rng: &mut StdRng, min: [f32; 3], max: [f32; 3]) -> [f32; 4] {
        let mut v = [0.0f32; 4];
        for i in 0..3 {
            v[i] = if min[i] < max[i] {
                rng.gen_range(min[i]..max[i])
            } else {
                min[i]
            };
        }
        v
    }

    /// Emit pass: draws indices from the dead free list, best effort. Each
    /// emit attempt beyond the free list's contents is dropped.
    fn emit(&mut self, count: u32) {
        let ranges = self.params.emit_ranges;
        for _ in 0..count {
            let index = match self.dead.try_pop() {
                Some(i) => i,
                None => continue,
            };
            let p = &mut self.particles[index as usize];
            p.position = Self::sample(&mut self.rng, ranges.position_min, ranges.position_max);
            p.velocity = Self::sample(&mut self.rng, ranges.velocity_min, ranges.velocity_max);
            p.acceleration =
                Self::sample(&mut self.rng, ranges.acceleration_min, ranges.acceleration_max);
            p.lifetime = self.params.particle_lifetime;
            p.scale = self.params.particle_scale.start;
            let pushed = self.alive[0].try_push(index);
            debug_assert!(pushed, "alive list full while the dead list had entries");
        }
    }

    /// Simulate pass: one pass over every slot, dead slots skipped. Forward
    /// Euler at the frame's measured dt; no sub-stepping.
    fn simulate(&mut self, dt: f32) {
        let lifetime_max = self.params.particle_lifetime;
        let scale = self.params.particle_scale;
        for index in 0..self.params.max_particle_count {
            let p = &mut self.particles[index as usize];
            if !p.is_alive() {
                continue;
            }
            for i in 0..3 {
                p.velocity[i] += p.acceleration[i] * dt;
                p.position[i] += p.velocity[i] * dt;
            }
            p.lifetime -= dt;
            if p.lifetime <= 0.0 {
                p.lifetime = 0.0;
                p.scale = 0.0;
                let pushed = self.dead.try_push(index);
                debug_assert!(pushed, "dead list overflow");
            } else {
                let t = 1.0 - p.lifetime / lifetime_max;
                p.scale = scale.start + (scale.end - scale.start) * t;
                let pushed = self.alive[1].try_push(index);
                debug_assert!(pushed, "alive write list overflow");
            }
        }
    }

    /// Runs one frame with the configured per-frame emit count. Returns the
    /// ring slot the frame's snapshot was staged into.
    pub fn step_frame(&mut self, dt: f32) -> usize {
        let emit = self.params.emit_count_per_frame;
        self.step_frame_with(dt, emit)
    }

    pub fn step_frame_with(&mut self, dt: f32, emit_count: u32) -> usize {
        self.emit(emit_count);
        self.simulate(dt);

        let slot = (self.frame % self.params.buffer_count as u64) as usize;
        self.staged[slot].copy_from_slice(&self.particles);
        self.staged_writer[slot] = Some(self.frame);

        // Ping-pong: next frame reads what this frame wrote, then the stale
        // write counter is reset.
        self.alive[0].copy_from(&self.alive[1]);
        self.alive[1].reset();

        self.frame += 1;
        self.total_time += dt;
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn small_params(max: u32, emit: u32) -> SimParams {
        SimParams {
            max_particle_count: max,
            emit_count_per_frame: emit,
            particle_lifetime: 5.0,
            ..SimParams::default()
        }
    }

    #[test]
    fn first_frame_emits_configured_count() {
        // 10 slots, emit 3, start fully dead.
        let mut sim = ParticleSim::new(small_params(10, 3), 1);
        sim.step_frame(1.0 / 60.0);
        assert_eq!(sim.alive_count(), 3);
        assert_eq!(sim.dead_count(), 7);
    }

    #[test]
    fn particles_expire_back_to_dead() {
        let mut sim = ParticleSim::new(small_params(10, 3), 2);
        sim.step_frame(1.0 / 60.0);
        // No further emission; run past the lifetime.
        while sim.total_time() < sim.params.particle_lifetime + 0.1 {
            sim.step_frame_with(1.0 / 60.0, 0);
        }
        assert_eq!(sim.alive_count(), 0);
        assert_eq!(sim.dead_count(), 10);
    }

    #[test]
    fn over_request_drops_excess_emits() {
        // Emit 15 into a pool of 10: exactly 10 come alive, counters intact.
        let mut sim = ParticleSim::new(small_params(10, 15), 3);
        sim.step_frame(1.0 / 60.0);
        assert_eq!(sim.alive_count(), 10);
        assert_eq!(sim.dead_count(), 0);
        // Next frame's over-request still must not corrupt anything.
        sim.step_frame(1.0 / 60.0);
        assert_eq!(sim.alive_count(), 10);
        assert_eq!(sim.dead_count(), 0);
    }

    #[test]
    fn conservation_at_every_frame_boundary() {
        let mut sim = ParticleSim::new(small_params(64, 7), 4);
        for _ in 0..400 {
            sim.step_frame(1.0 / 60.0);
            assert_eq!(sim.alive_count() + sim.dead_count(), 64);
        }
    }

    #[test]
    fn no_index_is_alive_twice() {
        let mut sim = ParticleSim::new(small_params(32, 5), 5);
        for _ in 0..300 {
            sim.step_frame(1.0 / 60.0);
            let indices = sim.alive_indices();
            let unique: HashSet<u32> = indices.iter().copied().collect();
            assert_eq!(indices.len(), unique.len());
        }
    }

    #[test]
    fn alive_entries_reference_live_particles() {
        let mut sim = ParticleSim::new(small_params(32, 4), 6);
        for _ in 0..200 {
            sim.step_frame(1.0 / 60.0);
            for i in sim.alive_indices() {
                assert!(sim.particle(i).is_alive());
            }
        }
    }

    #[test]
    fn write_list_is_empty_after_frame() {
        let mut sim = ParticleSim::new(small_params(16, 2), 7);
        sim.step_frame(1.0 / 60.0);
        // The stale write list's counter was reset by the frame epilogue.
        assert_eq!(sim.alive[1].len(), 0);
    }

    #[test]
    fn staged_slots_rotate_through_ring() {
        let mut sim = ParticleSim::new(small_params(8, 1), 8);
        let bc = sim.params.buffer_count as u64;
        for frame in 0..10u64 {
            let slot = sim.step_frame(1.0 / 60.0);
            assert_eq!(slot as u64, frame % bc);
            assert_eq!(sim.staged_writer(slot), Some(frame));
        }
    }

    #[test]
    fn emission_is_deterministic_per_seed() {
        let mut a = ParticleSim::new(small_params(16, 4), 42);
        let mut b = ParticleSim::new(small_params(16, 4), 42);
        for _ in 0..50 {
            a.step_frame(1.0 / 60.0);
            b.step_frame(1.0 / 60.0);
        }
        for i in 0..16 {
            assert_eq!(a.particle(i), b.particle(i));
        }
    }
}
