//! Factorised matrix manifolds.
//!
//! A rank-`r` matrix is written `U diag(f(S)) Vᵀ` and a symmetric one
//! `Q diag(f(L)) Qᵀ`, where the frames live on a Stiefel manifold (or SO for
//! square invertible matrices) and `f` is a [`DiagonalMap`]. All factors are
//! read out of one ambient matrix `X`:
//!
//! - the strict lower triangle of the first `r` columns gives `U` (or `Q`)
//! - the first `r` diagonal entries give `S` (or `L`)
//! - the strict upper triangle of the first `r` rows, transposed, gives `V`
//!
//! Every factorised manifold is the fibration `split → product → combine`.

use crate::fibered::Fibration;
use crate::product::ProductManifold;
use crate::reals::Rn;
use crate::so::SO;
use crate::spectral::DiagonalMap;
use crate::stiefel::Stiefel;
use crate::utils::with_dims;
use geotriv_core::{
    Description, Manifold, NamedTensors, OrderedMap, Registration, Result, Signature, Tensor,
    TrivializationError, Value,
};
use nalgebra::{DMatrix, DVector};
use rand::RngCore;

/// Checks `1 <= rank <= min(n, k)`.
pub(crate) fn check_rank(rank: usize, n: usize, k: usize) -> Result<()> {
    if rank == 0 || rank > n.min(k) {
        return Err(TrivializationError::invalid_parameter(
            "rank",
            format!("expected 1 <= rank <= {}, got {rank}", n.min(k)),
        ));
    }
    Ok(())
}

/// Singular values in decreasing order.
pub(crate) fn singular_values(m: DMatrix<f64>) -> Vec<f64> {
    let mut values: Vec<f64> = m.singular_values().iter().copied().collect();
    values.sort_by(|a, b| b.total_cmp(a));
    values
}

/// Eigenvalues of a symmetric matrix in increasing order.
pub(crate) fn symmetric_eigenvalues(m: DMatrix<f64>) -> Vec<f64> {
    let mut values: Vec<f64> = m.symmetric_eigenvalues().iter().copied().collect();
    values.sort_by(f64::total_cmp);
    values
}

/// Numerical rank: singular values above `tol` relative to `max(1, σ₁)`.
pub(crate) fn numerical_rank(sigma: &[f64], tol: f64) -> usize {
    let scale = sigma.first().copied().unwrap_or(0.0).max(1.0);
    sigma.iter().filter(|&&s| s > tol * scale).count()
}

/// Largest entry of `|X - Xᵀ|`.
pub(crate) fn asymmetry(m: &DMatrix<f64>) -> f64 {
    (m - m.transpose()).amax()
}

/// Whether every matrix of `value` has shape `shape` and satisfies `check`.
pub(crate) fn all_matrices<F>(value: &Value, shape: &[usize], check: F) -> bool
where
    F: Fn(DMatrix<f64>) -> bool,
{
    let Ok(t) = value.as_tensor() else {
        return false;
    };
    t.shape() == shape && t.is_finite() && (0..t.num_matrices()).all(|i| check(t.matrix(i)))
}

fn zero_with_diagonal(
    storage: Option<&mut Value>,
    rank: usize,
    rng: &mut dyn RngCore,
) -> Result<()> {
    let Some(value) = storage else {
        return Ok(());
    };
    let t = value.as_tensor_mut()?;
    t.fill(0.0);
    let (rows, cols) = match t.shape() {
        [.., r, c] => (*r, *c),
        _ => return Ok(()),
    };
    let diagonal = Tensor::randn(&[t.num_matrices(), rank], rng);
    let data = t.as_mut_slice();
    for i in 0..diagonal.num_vectors() {
        for (j, &s) in diagonal.vector(i).iter().enumerate() {
            data[i * rows * cols + j * cols + j] = s;
        }
    }
    Ok(())
}

/// `X ↦ {U, S, V}`: reads the factors of a rank-`r` matrix out of `X`.
///
/// Canonical initialisation zeroes `X` and samples the first `r` diagonal
/// entries from N(0, 1).
#[derive(Debug)]
pub struct Split {
    batch: Vec<usize>,
    n: usize,
    k: usize,
    rank: usize,
    registration: Registration,
}

impl Split {
    /// Splits `n x k` matrices into rank-`rank` factors.
    pub fn new(batch: &[usize], n: usize, k: usize, rank: usize) -> Result<Self> {
        check_rank(rank, n, k)?;
        Ok(Self {
            batch: batch.to_vec(),
            n,
            k,
            rank,
            registration: Registration::new(),
        })
    }
}

impl Manifold for Split {
    fn name(&self) -> &str {
        "Split"
    }

    fn ambient_signature(&self) -> Signature {
        Signature::Tensor(with_dims(&self.batch, &[self.n, self.k]))
    }

    fn output_signature(&self) -> Signature {
        let mut shapes = OrderedMap::new();
        shapes.insert("U", with_dims(&self.batch, &[self.n, self.rank]));
        shapes.insert("S", with_dims(&self.batch, &[self.rank]));
        shapes.insert("V", with_dims(&self.batch, &[self.k, self.rank]));
        Signature::Named(shapes)
    }

    fn forward(&self, x: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        let x = x.as_tensor()?;
        let r = self.rank;
        let count = x.num_matrices();
        let mut u = Vec::with_capacity(count);
        let mut s = Vec::with_capacity(count);
        let mut v = Vec::with_capacity(count);
        for i in 0..count {
            let m = x.matrix(i);
            u.push(DMatrix::from_fn(self.n, r, |a, b| if a > b { m[(a, b)] } else { 0.0 }));
            s.push(DVector::from_fn(r, |j, _| m[(j, j)]));
            v.push(DMatrix::from_fn(self.k, r, |a, b| if a > b { m[(b, a)] } else { 0.0 }));
        }
        let mut out = NamedTensors::new();
        out.insert("U", Tensor::from_matrices(&self.batch, self.n, r, &u)?);
        out.insert("S", Tensor::from_vectors(&self.batch, r, &s)?);
        out.insert("V", Tensor::from_matrices(&self.batch, self.k, r, &v)?);
        Ok(Value::Named(out))
    }

    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        self.output_signature().check(grad)?;
        let (gu, gs, gv) = (grad.component("U")?, grad.component("S")?, grad.component("V")?);
        let r = self.rank;
        let out = x.as_tensor()?.try_map_matrices(self.n, self.k, |i, _| {
            let (gu, gs, gv) = (gu.matrix(i), gs.vector(i), gv.matrix(i));
            let mut g = DMatrix::zeros(self.n, self.k);
            for b in 0..r {
                for a in b + 1..self.n {
                    g[(a, b)] = gu[(a, b)];
                }
                g[(b, b)] = gs[b];
                for a in b + 1..self.k {
                    g[(b, a)] = gv[(a, b)];
                }
            }
            Ok(g)
        })?;
        Ok(out.into())
    }

    fn canonical_init(&mut self, storage: Option<&mut Value>, rng: &mut dyn RngCore) -> Result<()> {
        zero_with_diagonal(storage, self.rank, rng)
    }

    fn contains(&self, value: &Value, _tol: f64) -> bool {
        self.output_signature().check(value).is_ok()
    }

    fn describe(&self) -> Description {
        Description::new("Split")
            .field("n", self.n)
            .field("k", self.k)
            .field("rank", self.rank)
            .tensorial_size(&self.batch)
    }

    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn registration_mut(&mut self) -> &mut Registration {
        &mut self.registration
    }
}

/// `{U, S, V} ↦ U diag(f(S)) Vᵀ`.
#[derive(Debug)]
pub struct Combine {
    batch: Vec<usize>,
    n: usize,
    k: usize,
    rank: usize,
    map: DiagonalMap,
    registration: Registration,
}

impl Combine {
    /// Combines rank-`rank` factors into `n x k` matrices.
    pub fn new(batch: &[usize], n: usize, k: usize, rank: usize, map: DiagonalMap) -> Self {
        Self {
            batch: batch.to_vec(),
            n,
            k,
            rank,
            map,
            registration: Registration::new(),
        }
    }
}

impl Manifold for Combine {
    fn name(&self) -> &str {
        "Combine"
    }

    fn ambient_signature(&self) -> Signature {
        let mut shapes = OrderedMap::new();
        shapes.insert("U", with_dims(&self.batch, &[self.n, self.rank]));
        shapes.insert("S", with_dims(&self.batch, &[self.rank]));
        shapes.insert("V", with_dims(&self.batch, &[self.k, self.rank]));
        Signature::Named(shapes)
    }

    fn output_signature(&self) -> Signature {
        Signature::Tensor(with_dims(&self.batch, &[self.n, self.k]))
    }

    fn forward(&self, x: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        let (u, s, v) = (x.component("U")?, x.component("S")?, x.component("V")?);
        let out = u.try_map_matrices(self.n, self.k, |i, u| {
            let d = s.vector(i).map(|x| self.map.apply(x));
            Ok(u * DMatrix::from_diagonal(&d) * v.matrix(i).transpose())
        })?;
        Ok(out.into())
    }

    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        self.output_signature().check(grad)?;
        let (u, s, v) = (x.component("U")?, x.component("S")?, x.component("V")?);
        let grad = grad.as_tensor()?;
        let count = u.num_matrices();
        let (mut gu, mut gs, mut gv) = (
            Vec::with_capacity(count),
            Vec::with_capacity(count),
            Vec::with_capacity(count),
        );
        for i in 0..count {
            let (ui, si, vi, g) = (u.matrix(i), s.vector(i), v.matrix(i), grad.matrix(i));
            let d = DMatrix::from_diagonal(&si.map(|x| self.map.apply(x)));
            let inner = ui.transpose() * &g * &vi;
            gu.push(&g * &vi * &d);
            gv.push(g.transpose() * &ui * &d);
            gs.push(DVector::from_fn(self.rank, |j, _| {
                self.map.derivative(si[j]) * inner[(j, j)]
            }));
        }
        let mut out = NamedTensors::new();
        out.insert("U", Tensor::from_matrices(&self.batch, self.n, self.rank, &gu)?);
        out.insert("S", Tensor::from_vectors(&self.batch, self.rank, &gs)?);
        out.insert("V", Tensor::from_matrices(&self.batch, self.k, self.rank, &gv)?);
        Ok(Value::Named(out))
    }

    fn canonical_init(&mut self, _storage: Option<&mut Value>, _rng: &mut dyn RngCore) -> Result<()> {
        Ok(())
    }

    fn contains(&self, value: &Value, _tol: f64) -> bool {
        self.output_signature().check(value).is_ok()
    }

    fn describe(&self) -> Description {
        Description::new("Combine")
            .field("n", self.n)
            .field("k", self.k)
            .field("rank", self.rank)
            .field("f", self.map)
            .tensorial_size(&self.batch)
    }

    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn registration_mut(&mut self) -> &mut Registration {
        &mut self.registration
    }
}

/// `X ↦ {Q, L}` for symmetric factorisations of `n x n` matrices.
#[derive(Debug)]
pub struct SymmetricSplit {
    batch: Vec<usize>,
    n: usize,
    rank: usize,
    registration: Registration,
}

impl SymmetricSplit {
    /// Splits `n x n` matrices into rank-`rank` symmetric factors.
    pub fn new(batch: &[usize], n: usize, rank: usize) -> Result<Self> {
        check_rank(rank, n, n)?;
        Ok(Self {
            batch: batch.to_vec(),
            n,
            rank,
            registration: Registration::new(),
        })
    }
}

impl Manifold for SymmetricSplit {
    fn name(&self) -> &str {
        "SymmetricSplit"
    }

    fn ambient_signature(&self) -> Signature {
        Signature::Tensor(with_dims(&self.batch, &[self.n, self.n]))
    }

    fn output_signature(&self) -> Signature {
        let mut shapes = OrderedMap::new();
        shapes.insert("Q", with_dims(&self.batch, &[self.n, self.rank]));
        shapes.insert("L", with_dims(&self.batch, &[self.rank]));
        Signature::Named(shapes)
    }

    fn forward(&self, x: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        let x = x.as_tensor()?;
        let r = self.rank;
        let mut q = Vec::with_capacity(x.num_matrices());
        let mut l = Vec::with_capacity(x.num_matrices());
        for i in 0..x.num_matrices() {
            let m = x.matrix(i);
            q.push(DMatrix::from_fn(self.n, r, |a, b| if a > b { m[(a, b)] } else { 0.0 }));
            l.push(DVector::from_fn(r, |j, _| m[(j, j)]));
        }
        let mut out = NamedTensors::new();
        out.insert("Q", Tensor::from_matrices(&self.batch, self.n, r, &q)?);
        out.insert("L", Tensor::from_vectors(&self.batch, r, &l)?);
        Ok(Value::Named(out))
    }

    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        self.output_signature().check(grad)?;
        let (gq, gl) = (grad.component("Q")?, grad.component("L")?);
        let out = x.as_tensor()?.try_map_matrices(self.n, self.n, |i, _| {
            let (gq, gl) = (gq.matrix(i), gl.vector(i));
            let mut g = DMatrix::zeros(self.n, self.n);
            for b in 0..self.rank {
                for a in b + 1..self.n {
                    g[(a, b)] = gq[(a, b)];
                }
                g[(b, b)] = gl[b];
            }
            Ok(g)
        })?;
        Ok(out.into())
    }

    fn canonical_init(&mut self, storage: Option<&mut Value>, rng: &mut dyn RngCore) -> Result<()> {
        zero_with_diagonal(storage, self.rank, rng)
    }

    fn contains(&self, value: &Value, _tol: f64) -> bool {
        self.output_signature().check(value).is_ok()
    }

    fn describe(&self) -> Description {
        Description::new("SymmetricSplit")
            .field("n", self.n)
            .field("rank", self.rank)
            .tensorial_size(&self.batch)
    }

    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn registration_mut(&mut self) -> &mut Registration {
        &mut self.registration
    }
}

/// `{Q, L} ↦ Q diag(f(L)) Qᵀ`.
#[derive(Debug)]
pub struct SymmetricCombine {
    batch: Vec<usize>,
    n: usize,
    rank: usize,
    map: DiagonalMap,
    registration: Registration,
}

impl SymmetricCombine {
    /// Combines rank-`rank` symmetric factors into `n x n` matrices.
    pub fn new(batch: &[usize], n: usize, rank: usize, map: DiagonalMap) -> Self {
        Self {
            batch: batch.to_vec(),
            n,
            rank,
            map,
            registration: Registration::new(),
        }
    }
}

impl Manifold for SymmetricCombine {
    fn name(&self) -> &str {
        "SymmetricCombine"
    }

    fn ambient_signature(&self) -> Signature {
        let mut shapes = OrderedMap::new();
        shapes.insert("Q", with_dims(&self.batch, &[self.n, self.rank]));
        shapes.insert("L", with_dims(&self.batch, &[self.rank]));
        Signature::Named(shapes)
    }

    fn output_signature(&self) -> Signature {
        Signature::Tensor(with_dims(&self.batch, &[self.n, self.n]))
    }

    fn forward(&self, x: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        let (q, l) = (x.component("Q")?, x.component("L")?);
        let out = q.try_map_matrices(self.n, self.n, |i, q| {
            let d = DMatrix::from_diagonal(&l.vector(i).map(|x| self.map.apply(x)));
            Ok(&q * d * q.transpose())
        })?;
        Ok(out.into())
    }

    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        self.output_signature().check(grad)?;
        let (q, l) = (x.component("Q")?, x.component("L")?);
        let grad = grad.as_tensor()?;
        let count = q.num_matrices();
        let mut gq = Vec::with_capacity(count);
        let mut gl = Vec::with_capacity(count);
        for i in 0..count {
            let (qi, li, g) = (q.matrix(i), l.vector(i), grad.matrix(i));
            let d = DMatrix::from_diagonal(&li.map(|x| self.map.apply(x)));
            let inner = qi.transpose() * &g * &qi;
            gq.push((&g + g.transpose()) * &qi * d);
            gl.push(DVector::from_fn(self.rank, |j, _| {
                self.map.derivative(li[j]) * inner[(j, j)]
            }));
        }
        let mut out = NamedTensors::new();
        out.insert("Q", Tensor::from_matrices(&self.batch, self.n, self.rank, &gq)?);
        out.insert("L", Tensor::from_vectors(&self.batch, self.rank, &gl)?);
        Ok(Value::Named(out))
    }

    fn canonical_init(&mut self, _storage: Option<&mut Value>, _rng: &mut dyn RngCore) -> Result<()> {
        Ok(())
    }

    fn contains(&self, value: &Value, _tol: f64) -> bool {
        self.output_signature().check(value).is_ok()
    }

    fn describe(&self) -> Description {
        Description::new("SymmetricCombine")
            .field("n", self.n)
            .field("rank", self.rank)
            .field("f", self.map)
            .tensorial_size(&self.batch)
    }

    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn registration_mut(&mut self) -> &mut Registration {
        &mut self.registration
    }
}

/// Which manifold the frames `U` and `V` live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Frames {
    /// `n x r` and `k x r` Stiefel frames
    Stiefel,
    /// `n x n` rotations, for full-rank square matrices with positive determinant
    Rotations,
}

/// `Split → {U, S, V} → Combine` for `n x k` matrices of rank `rank`.
pub(crate) fn factorized_fibration(
    batch: &[usize],
    n: usize,
    k: usize,
    rank: usize,
    map: DiagonalMap,
    frames: Frames,
) -> Result<Fibration> {
    let frame = |rows: usize| -> Result<Box<dyn Manifold>> {
        match frames {
            Frames::Stiefel => Ok(Box::new(Stiefel::new(&with_dims(batch, &[rows, rank]))?)),
            Frames::Rotations => Ok(Box::new(SO::new(&with_dims(batch, &[rows, rows]))?)),
        }
    };
    let components: Vec<(&str, Box<dyn Manifold>)> = vec![
        ("U", frame(n)?),
        ("S", Box::new(Rn::new(&with_dims(batch, &[rank]))?)),
        ("V", frame(k)?),
    ];
    Fibration::new(vec![
        Box::new(Split::new(batch, n, k, rank)?),
        Box::new(ProductManifold::new(components)?),
        Box::new(Combine::new(batch, n, k, rank, map)),
    ])
}

/// `SymmetricSplit → {Q, L} → SymmetricCombine` for `n x n` matrices of rank `rank`.
pub(crate) fn symmetric_fibration(
    batch: &[usize],
    n: usize,
    rank: usize,
    map: DiagonalMap,
) -> Result<Fibration> {
    let components: Vec<(&str, Box<dyn Manifold>)> = vec![
        ("Q", Box::new(Stiefel::new(&with_dims(batch, &[n, rank]))?)),
        ("L", Box::new(Rn::new(&with_dims(batch, &[rank]))?)),
    ];
    Fibration::new(vec![
        Box::new(SymmetricSplit::new(batch, n, rank)?),
        Box::new(ProductManifold::new(components)?),
        Box::new(SymmetricCombine::new(batch, n, rank, map)),
    ])
}
