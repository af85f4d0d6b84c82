use crate::core::SurfaceId;
use log::debug;
use parking_lot::{Mutex, MutexGuard};
use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

type ReleaseFn = Box<dyn FnOnce(NonNull<c_void>) + Send>;

/// 原生窗口（由宿主创建，管线只持有引用）
struct NativeWindow {
    raw: NonNull<c_void>,
    release: Option<ReleaseFn>,
}

// 原生窗口指针由宿主保证跨线程有效；release 只会在最后一个引用 drop 时执行一次
unsafe impl Send for NativeWindow {}
unsafe impl Sync for NativeWindow {}

impl Drop for NativeWindow {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.raw);
        }
    }
}

/// 渲染目标句柄（不透明，可克隆，按原生指针身份比较）
#[derive(Clone)]
pub struct SurfaceHandle {
    inner: Arc<NativeWindow>,
}

impl SurfaceHandle {
    /// 包装宿主传入的原生窗口指针
    pub fn from_raw(raw: NonNull<c_void>) -> Self {
        Self {
            inner: Arc::new(NativeWindow { raw, release: None }),
        }
    }

    /// 包装原生窗口指针，最后一个引用释放时调用 `release`（例如 ANativeWindow_release）
    pub fn with_release<F>(raw: NonNull<c_void>, release: F) -> Self
    where
        F: FnOnce(NonNull<c_void>) + Send + 'static,
    {
        Self {
            inner: Arc::new(NativeWindow {
                raw,
                release: Some(Box::new(release)),
            }),
        }
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.inner.raw.as_ptr()
    }

    pub fn id(&self) -> SurfaceId {
        SurfaceId(self.inner.raw.as_ptr() as usize)
    }

    /// 身份比较（同一个原生窗口），不比较内容
    pub fn same_window(&self, other: &SurfaceHandle) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SurfaceHandle({:#x})", self.id().0)
    }
}

fn same_identity(a: Option<&SurfaceHandle>, b: Option<&SurfaceHandle>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_window(b),
        _ => false,
    }
}

struct SurfaceCell {
    handle: Option<SurfaceHandle>,
    needs_reconfigure: bool,
    /// 每次身份变化 +1，用于确认节点绑定的是哪一次切换
    generation: u64,
    /// 管线销毁后置位，之后的 set 全部拒绝
    closed: bool,
}

/// 某一时刻的 Surface 快照
#[derive(Debug, Clone)]
pub struct SurfaceSnapshot {
    pub handle: Option<SurfaceHandle>,
    pub generation: u64,
}

/// Surface 注册表：唯一的跨线程可变状态
///
/// 控制线程通过 [`SurfaceRegistry::set`] 写入，解码/渲染线程通过
/// [`SurfaceRegistry::pending_for`] + [`SurfaceRegistry::acknowledge`] 读取与清除。
/// 临界区只做指针/标志赋值。
pub struct SurfaceRegistry {
    cell: Mutex<SurfaceCell>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self {
            cell: Mutex::new(SurfaceCell {
                handle: None,
                needs_reconfigure: false,
                generation: 0,
                closed: false,
            }),
        }
    }

    /// 设置新的 Surface；身份相同则忽略
    ///
    /// 返回 `(是否变化, 需要释放的句柄)`：变化时为被替换的旧句柄，
    /// 注册表已关闭时为传入的新句柄。由调用方在锁外释放。
    pub fn set(&self, handle: Option<SurfaceHandle>) -> (bool, Option<SurfaceHandle>) {
        let mut cell = self.cell.lock();
        if cell.closed {
            return (false, handle);
        }
        if same_identity(cell.handle.as_ref(), handle.as_ref()) {
            return (false, None);
        }
        let previous = std::mem::replace(&mut cell.handle, handle);
        cell.needs_reconfigure = true;
        cell.generation += 1;
        (true, previous)
    }

    pub fn is_reconfigure_needed(&self) -> bool {
        self.cell.lock().needs_reconfigure
    }

    /// 无条件清除重配置标志
    ///
    /// 只影响标志本身：节点按 generation 判断是否需要重新绑定，
    /// 外部清除不会让节点漏掉这次切换。
    pub fn clear_reconfigure_needed(&self) {
        self.cell.lock().needs_reconfigure = false;
    }

    /// 相对于 `bound_generation` 有待处理的切换（或标志仍置位）时返回快照
    pub fn pending_for(&self, bound_generation: u64) -> Option<SurfaceSnapshot> {
        let cell = self.cell.lock();
        if cell.closed || (!cell.needs_reconfigure && cell.generation == bound_generation) {
            return None;
        }
        Some(SurfaceSnapshot {
            handle: cell.handle.clone(),
            generation: cell.generation,
        })
    }

    /// 确认已绑定到 `generation` 对应的 Surface
    ///
    /// 若在快照与确认之间又发生了切换，标志保持为 true，返回 false。
    pub fn acknowledge(&self, generation: u64) -> bool {
        let mut cell = self.cell.lock();
        if cell.generation != generation {
            return false;
        }
        cell.needs_reconfigure = false;
        true
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        let cell = self.cell.lock();
        SurfaceSnapshot {
            handle: cell.handle.clone(),
            generation: cell.generation,
        }
    }

    pub fn current(&self) -> Option<SurfaceHandle> {
        self.cell.lock().handle.clone()
    }

    /// 显式加锁，离开作用域自动解锁
    pub fn lock(&self) -> SurfaceGuard<'_> {
        SurfaceGuard {
            cell: self.cell.lock(),
        }
    }

    /// 取出当前句柄并关闭注册表（管线销毁时调用），不触发重配置
    pub fn release(&self) -> Option<SurfaceHandle> {
        let mut cell = self.cell.lock();
        cell.closed = true;
        cell.needs_reconfigure = false;
        let handle = cell.handle.take();
        drop(cell);
        if handle.is_some() {
            debug!("Surface 引用已释放");
        }
        handle
    }
}

impl Default for SurfaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Surface 锁守卫（对应 lock_surface / unlock_surface）
pub struct SurfaceGuard<'a> {
    cell: MutexGuard<'a, SurfaceCell>,
}

impl SurfaceGuard<'_> {
    pub fn handle(&self) -> Option<&SurfaceHandle> {
        self.cell.handle.as_ref()
    }

    pub fn needs_reconfigure(&self) -> bool {
        self.cell.needs_reconfigure
    }

    pub fn generation(&self) -> u64 {
        self.cell.generation
    }
}
