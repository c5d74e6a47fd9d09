use glam::{Vec2, Vec3, Vec4};

bitflags::bitflags! {
    /// 随 push constant 传给 shader 的 mesh 标记
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MeshFlags: u32 {
        const HAS_NORMALS = 1 << 0;
        const HAS_TANGENTS = 1 << 1;
        const HAS_UVS = 1 << 2;
    }
}

/// 顶点数据在 storage buffer 中的分段布局
///
/// 各属性不交错存放：
/// `[position: float3 * n][normal: float3 * n][tangent: float4 * n][uv: float2 * n]`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshLayout {
    pub vertex_count: u32,
}
impl MeshLayout {
    const POSITION_SIZE: u64 = size_of::<Vec3>() as u64;
    const NORMAL_SIZE: u64 = size_of::<Vec3>() as u64;
    const TANGENT_SIZE: u64 = size_of::<Vec4>() as u64;
    const UV_SIZE: u64 = size_of::<Vec2>() as u64;

    /// 每个顶点的所有属性占用的字节数
    pub const BYTES_PER_VERTEX: u64 = Self::POSITION_SIZE + Self::NORMAL_SIZE + Self::TANGENT_SIZE + Self::UV_SIZE;

    #[inline]
    pub fn new(vertex_count: u32) -> Self {
        Self { vertex_count }
    }

    #[inline]
    pub fn position_offset(&self) -> u64 {
        0
    }

    #[inline]
    pub fn normal_offset(&self) -> u64 {
        Self::POSITION_SIZE * self.vertex_count as u64
    }

    #[inline]
    pub fn tangent_offset(&self) -> u64 {
        (Self::POSITION_SIZE + Self::NORMAL_SIZE) * self.vertex_count as u64
    }

    #[inline]
    pub fn uv_offset(&self) -> u64 {
        (Self::POSITION_SIZE + Self::NORMAL_SIZE + Self::TANGENT_SIZE) * self.vertex_count as u64
    }

    #[inline]
    pub fn total_size(&self) -> u64 {
        Self::BYTES_PER_VERTEX * self.vertex_count as u64
    }
}

/// 一个 mesh 在 CPU 侧的顶点与索引数据
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    /// 为空时由 [`calculate_tangents`] 生成
    pub tangents: Vec<Vec4>,
    pub indices: Vec<u32>,
}
impl MeshData {
    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }

    /// 属性长度与顶点数一致，索引是完整的三角形并且不越界
    pub fn validate(&self) -> Result<(), String> {
        let n = self.positions.len();
        if self.normals.len() != n || self.uvs.len() != n {
            return Err(format!(
                "attribute count mismatch: {} positions, {} normals, {} uvs",
                n,
                self.normals.len(),
                self.uvs.len()
            ));
        }
        if !self.tangents.is_empty() && self.tangents.len() != n {
            return Err(format!("{} tangents for {} vertices", self.tangents.len(), n));
        }
        if self.indices.len() % 3 != 0 {
            return Err(format!("index count {} is not a multiple of 3", self.indices.len()));
        }
        if let Some(bad) = self.indices.iter().find(|i| **i as usize >= n) {
            return Err(format!("index {} out of range for {} vertices", bad, n));
        }
        Ok(())
    }

    /// 需要时生成切线
    pub fn ensure_tangents(&mut self) {
        if self.tangents.is_empty() {
            self.tangents = calculate_tangents(&self.indices, &self.positions, &self.normals, &self.uvs);
        }
    }

    pub fn flags(&self) -> MeshFlags {
        let mut flags = MeshFlags::empty();
        flags.set(MeshFlags::HAS_NORMALS, !self.normals.is_empty());
        flags.set(MeshFlags::HAS_TANGENTS, !self.tangents.is_empty());
        flags.set(MeshFlags::HAS_UVS, !self.uvs.is_empty());
        flags
    }

    /// 按 [`MeshLayout`] 打包成一段连续的字节
    pub fn pack_vertex_data(&self) -> Vec<u8> {
        let layout = MeshLayout::new(self.vertex_count());
        let mut bytes = Vec::with_capacity(layout.total_size() as usize);
        bytes.extend_from_slice(bytemuck::cast_slice(&self.positions));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.normals));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.tangents));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.uvs));
        bytes
    }
}

/// 逐三角形累加 uv 方向，再对法线做 Gram-Schmidt 正交化
///
/// w 分量是副切线的方向（±1）
pub fn calculate_tangents(indices: &[u32], positions: &[Vec3], normals: &[Vec3], uvs: &[Vec2]) -> Vec<Vec4> {
    let vertex_count = positions.len();
    let mut tan1 = vec![Vec3::ZERO; vertex_count];
    let mut tan2 = vec![Vec3::ZERO; vertex_count];

    for tri in indices.chunks_exact(3) {
        let (i1, i2, i3) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);

        let e1 = positions[i2] - positions[i1];
        let e2 = positions[i3] - positions[i1];
        let d1 = uvs[i2] - uvs[i1];
        let d2 = uvs[i3] - uvs[i1];

        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() <= f32::EPSILON {
            // uv 退化的三角形不贡献方向
            continue;
        }
        let r = 1.0 / det;
        let sdir = (e1 * d2.y - e2 * d1.y) * r;
        let tdir = (e2 * d1.x - e1 * d2.x) * r;

        for i in [i1, i2, i3] {
            tan1[i] += sdir;
            tan2[i] += tdir;
        }
    }

    (0..vertex_count)
        .map(|a| {
            let n = normals[a];
            let t = tan1[a];
            let ortho = (t - n * n.dot(t)).normalize_or_zero();
            let tangent = if ortho == Vec3::ZERO { fallback_tangent(n) } else { ortho };
            let sign = if n.cross(t).dot(tan2[a]) < 0.0 { -1.0 } else { 1.0 };
            tangent.extend(sign)
        })
        .collect()
}

/// 任意一个与法线垂直的单位向量
fn fallback_tangent(n: Vec3) -> Vec3 {
    let axis = if n.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    (axis - n * n.dot(axis)).normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshData {
        MeshData {
            positions: vec![
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(-1.0, 1.0, 0.0),
            ],
            normals: vec![Vec3::Z; 4],
            uvs: vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)],
            tangents: vec![],
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    #[test]
    fn test_layout_offsets() {
        let layout = MeshLayout::new(10);
        assert_eq!(MeshLayout::BYTES_PER_VERTEX, 48);
        assert_eq!(layout.position_offset(), 0);
        assert_eq!(layout.normal_offset(), 120);
        assert_eq!(layout.tangent_offset(), 240);
        assert_eq!(layout.uv_offset(), 400);
        assert_eq!(layout.total_size(), 480);
    }

    #[test]
    fn test_quad_tangents() {
        let mesh = quad();
        let tangents = calculate_tangents(&mesh.indices, &mesh.positions, &mesh.normals, &mesh.uvs);
        assert_eq!(tangents.len(), 4);
        for t in tangents {
            // u 方向与 +x 一致
            assert!((t.truncate() - Vec3::X).length() < 1e-5, "{t:?}");
            assert_eq!(t.w, 1.0);
        }
    }

    #[test]
    fn test_mirrored_uv_flips_handedness() {
        let mut mesh = quad();
        for uv in &mut mesh.uvs {
            uv.y = 1.0 - uv.y;
        }
        let tangents = calculate_tangents(&mesh.indices, &mesh.positions, &mesh.normals, &mesh.uvs);
        assert!(tangents.iter().all(|t| t.w == -1.0));
    }

    #[test]
    fn test_degenerate_uv_falls_back() {
        let mut mesh = quad();
        mesh.uvs = vec![Vec2::ZERO; 4];
        let tangents = calculate_tangents(&mesh.indices, &mesh.positions, &mesh.normals, &mesh.uvs);
        for t in tangents {
            let t3 = t.truncate();
            assert!((t3.length() - 1.0).abs() < 1e-5);
            assert!(t3.dot(Vec3::Z).abs() < 1e-5);
            assert!(t.w.is_finite());
        }
    }

    #[test]
    fn test_pack_vertex_data() {
        let mut mesh = quad();
        mesh.ensure_tangents();
        assert!(mesh.validate().is_ok());
        assert_eq!(mesh.flags(), MeshFlags::all());

        let bytes = mesh.pack_vertex_data();
        let layout = MeshLayout::new(mesh.vertex_count());
        assert_eq!(bytes.len() as u64, layout.total_size());

        let uv_offset = layout.uv_offset() as usize;
        let uv1: Vec2 = bytemuck::pod_read_unaligned(&bytes[uv_offset + 8..uv_offset + 16]);
        assert_eq!(uv1, Vec2::new(1.0, 0.0));
        let n_offset = layout.normal_offset() as usize;
        let n0: Vec3 = bytemuck::pod_read_unaligned(&bytes[n_offset..n_offset + 12]);
        assert_eq!(n0, Vec3::Z);
    }

    #[test]
    fn test_validate() {
        let mut mesh = quad();
        mesh.indices.push(9);
        assert!(mesh.validate().is_err());

        let mut mesh = quad();
        mesh.normals.pop();
        assert!(mesh.validate().is_err());
    }
}
